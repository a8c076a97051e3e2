use serde::{Deserialize, Serialize};

/// Role a device plays in the shared session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// The tethered mobile device.
    Primary,
    /// The external or built-in camera next to it.
    Secondary,
}

impl SourceKind {
    /// Role for a device with the given identity, or `None` when the device
    /// must be ignored (host-vendor cameras).
    pub fn classify(
        model_id: &str,
        manufacturer: &str,
        primary_model_id: &str,
        host_vendor: &str,
    ) -> Option<Self> {
        if model_id == primary_model_id {
            Some(Self::Primary)
        } else if manufacturer == host_vendor {
            None
        } else {
            Some(Self::Secondary)
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary)
    }
}
