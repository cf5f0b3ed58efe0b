use spacetimedb::SpacetimeType;
use serde::{Serialize, Deserialize};

/// Where a transient notification is rendered on the client HUD.
#[derive(SpacetimeType, Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
pub enum NotificationKind {
    Center,  // Large center-screen notice (cooldown, "all traders found")
    TopLeft, // Small top-left confirmation with optional icon ("pin added")
}
