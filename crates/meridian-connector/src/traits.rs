//! Connector traits
//!
//! The sync core only ever reads from a connected system during import, so
//! the surface here is a single capability: open a lazy object stream.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ConnectorResult;
use crate::import::ConnectedSystemImportObject;

/// Object stream produced by one import.
///
/// Finite and ordered. It cannot be restarted: once drained, a fresh import
/// has to be requested.
pub type ImportStream<'a> = BoxStream<'a, ConnectorResult<ConnectedSystemImportObject>>;

/// Whether the connector should enumerate everything or only changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Complete snapshot; absence implies deletion.
    Full,
    /// Changes since the previous import, with declared change types.
    Delta,
}

/// Parameters of one import request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub mode: ImportMode,

    /// Partition of the connected system to enumerate, if partitioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl ImportRequest {
    #[must_use]
    pub fn full() -> Self {
        Self {
            mode: ImportMode::Full,
            partition: None,
        }
    }

    #[must_use]
    pub fn delta() -> Self {
        Self {
            mode: ImportMode::Delta,
            partition: None,
        }
    }

    #[must_use]
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }
}

/// Capability for importing objects from a connected system.
#[async_trait]
pub trait ImportConnector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Test the connection to the connected system.
    async fn test_connection(&self) -> ConnectorResult<()> {
        Ok(())
    }

    /// Open an import stream.
    ///
    /// Errors returned here mean no object could be read at all. Errors
    /// yielded by the stream concern either one record
    /// ([`ConnectorError::is_object_level`](crate::error::ConnectorError::is_object_level))
    /// or end the stream.
    async fn import(&self, request: &ImportRequest) -> ConnectorResult<ImportStream<'_>>;
}
