use serde::Deserialize;

// ============================================================================
// Order Commands - Admin-issued status changes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum OrderCommand {
    StartProcessing,
    Ship {
        #[serde(default)]
        tracking_number: Option<String>,
        #[serde(default)]
        carrier: Option<String>,
    },
    Deliver,
    Cancel {
        #[serde(default)]
        reason: Option<String>,
    },
}
