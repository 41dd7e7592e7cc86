//! Flow-controlled streaming links between opaque components.
//!
//! A link only records which handshake fields the producer and consumer
//! exchange. Links never buffer; backpressure (`ready`), qualification
//! (`valid`) and framing (`last`) are implemented by the components.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// A handshake field of a stream interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamField {
    Valid,
    Ready,
    Last,
    Data,
}

impl StreamField {
    pub const ALL: [StreamField; 4] = [
        StreamField::Valid,
        StreamField::Ready,
        StreamField::Last,
        StreamField::Data,
    ];

    /// Fields every link must carry.
    pub const REQUIRED: [StreamField; 3] =
        [StreamField::Valid, StreamField::Ready, StreamField::Data];
}

impl fmt::Display for StreamField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamField::Valid => write!(f, "valid"),
            StreamField::Ready => write!(f, "ready"),
            StreamField::Last => write!(f, "last"),
            StreamField::Data => write!(f, "data"),
        }
    }
}

/// One side of a stream interface on a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamEndpoint {
    /// Owning component (e.g., "pcie_dma0").
    pub component: String,
    /// Port on the component (e.g., "source").
    pub port: String,
    pub fields: BTreeSet<StreamField>,
    /// Width of the `data` field in bits.
    pub data_width: u32,
}

impl StreamEndpoint {
    /// An endpoint exposing all four handshake fields.
    pub fn new(component: impl Into<String>, port: impl Into<String>, data_width: u32) -> Self {
        Self::with_fields(component, port, StreamField::ALL, data_width)
    }

    /// An endpoint exposing only the given fields.
    pub fn with_fields(
        component: impl Into<String>,
        port: impl Into<String>,
        fields: impl IntoIterator<Item = StreamField>,
        data_width: u32,
    ) -> Self {
        Self {
            component: component.into(),
            port: port.into(),
            fields: fields.into_iter().collect(),
            data_width,
        }
    }

    /// `component.port`.
    pub fn id(&self) -> String {
        format!("{}.{}", self.component, self.port)
    }
}

/// A unidirectional producer -> consumer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLink {
    pub producer: StreamEndpoint,
    pub consumer: StreamEndpoint,
    /// Negotiated field subset.
    pub keep: BTreeSet<StreamField>,
}

impl StreamLink {
    pub fn data_width(&self) -> u32 {
        self.producer.data_width
    }
}

impl fmt::Display for StreamLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keep: Vec<String> = self.keep.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} -> {} [{}] {}-bit",
            self.producer.id(),
            self.consumer.id(),
            keep.join(", "),
            self.data_width()
        )
    }
}

/// Errors raised while negotiating a link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("link {producer} -> {consumer} does not keep required field '{field}'")]
    MissingRequiredField {
        producer: String,
        consumer: String,
        field: StreamField,
    },

    #[error("field '{field}' is kept but not provided by endpoint {endpoint}")]
    FieldNotOnEndpoint { endpoint: String, field: StreamField },

    #[error("data width mismatch: {producer} is {producer_width}-bit, {consumer} is {consumer_width}-bit")]
    WidthMismatch {
        producer: String,
        consumer: String,
        producer_width: u32,
        consumer_width: u32,
    },

    #[error("endpoint {0} is already connected")]
    EndpointInUse(String),
}

/// Registry of negotiated stream links.
#[derive(Debug, Clone, Default)]
pub struct StreamInterconnect {
    links: Vec<StreamLink>,
    producers: BTreeSet<String>,
    consumers: BTreeSet<String>,
}

impl StreamInterconnect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiate and record a link carrying exactly `keep`.
    pub fn connect(
        &mut self,
        producer: StreamEndpoint,
        consumer: StreamEndpoint,
        keep: impl IntoIterator<Item = StreamField>,
    ) -> Result<&StreamLink, StreamError> {
        let keep: BTreeSet<StreamField> = keep.into_iter().collect();
        let (pid, cid) = (producer.id(), consumer.id());

        for field in StreamField::REQUIRED {
            if !keep.contains(&field) {
                return Err(StreamError::MissingRequiredField {
                    producer: pid,
                    consumer: cid,
                    field,
                });
            }
        }
        for endpoint in [&producer, &consumer] {
            if let Some(field) = keep.iter().find(|f| !endpoint.fields.contains(*f)) {
                return Err(StreamError::FieldNotOnEndpoint {
                    endpoint: endpoint.id(),
                    field: *field,
                });
            }
        }
        if producer.data_width != consumer.data_width {
            return Err(StreamError::WidthMismatch {
                producer_width: producer.data_width,
                consumer_width: consumer.data_width,
                producer: pid,
                consumer: cid,
            });
        }
        if self.producers.contains(&pid) {
            return Err(StreamError::EndpointInUse(pid));
        }
        if self.consumers.contains(&cid) {
            return Err(StreamError::EndpointInUse(cid));
        }

        let link = StreamLink {
            producer,
            consumer,
            keep,
        };
        debug!(link = %link, "connected stream");
        self.producers.insert(pid);
        self.consumers.insert(cid);
        self.links.push(link);
        Ok(&self.links[self.links.len() - 1])
    }

    pub fn links(&self) -> &[StreamLink] {
        &self.links
    }

    pub fn into_links(self) -> Vec<StreamLink> {
        self.links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [StreamField; 4] = StreamField::ALL;

    #[test]
    fn bridge_links_negotiate_full_handshake() {
        let mut ic = StreamInterconnect::new();
        let rx = ic
            .connect(
                StreamEndpoint::new("pcie_dma0", "source", 64),
                StreamEndpoint::new("lime_top", "dma_rx", 64),
                ALL,
            )
            .unwrap();
        assert_eq!(rx.keep.len(), 4);
        assert_eq!(rx.data_width(), 64);

        ic.connect(
            StreamEndpoint::new("lime_top", "dma_tx", 64),
            StreamEndpoint::new("pcie_dma0", "sink", 64),
            ALL,
        )
        .unwrap();
        assert_eq!(ic.links().len(), 2);
    }

    #[test]
    fn keep_may_drop_last() {
        let mut ic = StreamInterconnect::new();
        let link = ic
            .connect(
                StreamEndpoint::new("a", "source", 32),
                StreamEndpoint::with_fields("b", "sink", StreamField::REQUIRED, 32),
                StreamField::REQUIRED,
            )
            .unwrap();
        assert!(!link.keep.contains(&StreamField::Last));
        for field in StreamField::REQUIRED {
            assert!(link.keep.contains(&field));
            assert!(link.producer.fields.contains(&field));
            assert!(link.consumer.fields.contains(&field));
        }
    }

    #[test]
    fn keep_must_include_required_fields() {
        let mut ic = StreamInterconnect::new();
        let err = ic
            .connect(
                StreamEndpoint::new("a", "source", 32),
                StreamEndpoint::new("b", "sink", 32),
                [StreamField::Valid, StreamField::Data, StreamField::Last],
            )
            .unwrap_err();
        assert_eq!(
            err,
            StreamError::MissingRequiredField {
                producer: "a.source".into(),
                consumer: "b.sink".into(),
                field: StreamField::Ready,
            }
        );
        assert!(ic.links().is_empty());
    }

    #[test]
    fn keep_must_be_common_subset() {
        let mut ic = StreamInterconnect::new();
        let err = ic
            .connect(
                StreamEndpoint::new("a", "source", 32),
                StreamEndpoint::with_fields("b", "sink", StreamField::REQUIRED, 32),
                ALL,
            )
            .unwrap_err();
        assert_eq!(
            err,
            StreamError::FieldNotOnEndpoint {
                endpoint: "b.sink".into(),
                field: StreamField::Last,
            }
        );
    }

    #[test]
    fn widths_must_match() {
        let mut ic = StreamInterconnect::new();
        assert!(matches!(
            ic.connect(
                StreamEndpoint::new("a", "source", 64),
                StreamEndpoint::new("b", "sink", 32),
                ALL,
            ),
            Err(StreamError::WidthMismatch { producer_width: 64, consumer_width: 32, .. })
        ));
    }

    #[test]
    fn endpoint_is_used_once() {
        let mut ic = StreamInterconnect::new();
        ic.connect(
            StreamEndpoint::new("a", "source", 8),
            StreamEndpoint::new("b", "sink", 8),
            ALL,
        )
        .unwrap();
        assert_eq!(
            ic.connect(
                StreamEndpoint::new("a", "source", 8),
                StreamEndpoint::new("c", "sink", 8),
                ALL,
            )
            .unwrap_err(),
            StreamError::EndpointInUse("a.source".into())
        );
        assert_eq!(
            ic.connect(
                StreamEndpoint::new("d", "source", 8),
                StreamEndpoint::new("b", "sink", 8),
                ALL,
            )
            .unwrap_err(),
            StreamError::EndpointInUse("b.sink".into())
        );
    }

    #[test]
    fn link_display() {
        let mut ic = StreamInterconnect::new();
        let link = ic
            .connect(
                StreamEndpoint::new("pcie_dma0", "source", 64),
                StreamEndpoint::new("lime_top", "dma_rx", 64),
                ALL,
            )
            .unwrap();
        assert_eq!(
            link.to_string(),
            "pcie_dma0.source -> lime_top.dma_rx [valid, ready, last, data] 64-bit"
        );
    }
}
