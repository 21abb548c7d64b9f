//! Status enums for orders and members.

use serde::{Deserialize, Serialize};

/// Order fulfillment status.
///
/// Orders start as `Processing` and may only move to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Processing,
    Completed,
}

impl OrderStatus {
    /// Whether an order in this status may be moved to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!((self, next), (Self::Processing, Self::Completed))
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "Processing"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Processing" | "processing" => Ok(Self::Processing),
            "Completed" | "completed" => Ok(Self::Completed),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Member permission tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    /// Regular shopper.
    #[default]
    General,
    /// Back-office access to members, orders, and the catalog.
    Admin,
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid member role: {s}")),
        }
    }
}

/// Whether a member account may sign in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    #[default]
    Active,
    Disabled,
}

impl MemberStatus {
    /// The opposite status.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Active => Self::Disabled,
            Self::Disabled => Self::Active,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_transitions() {
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Completed.is_terminal());
    }

    #[test]
    fn test_order_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Processing).unwrap(),
            "\"Processing\""
        );
        assert!(serde_json::from_str::<OrderStatus>("\"Shipped\"").is_err());
    }

    #[test]
    fn test_member_role_round_trip() {
        assert_eq!("admin".parse::<MemberRole>().unwrap(), MemberRole::Admin);
        assert_eq!(MemberRole::General.to_string(), "general");
        assert!("owner".parse::<MemberRole>().is_err());
    }

    #[test]
    fn test_member_status_toggle() {
        assert_eq!(MemberStatus::Active.toggled(), MemberStatus::Disabled);
        assert_eq!(MemberStatus::Disabled.toggled(), MemberStatus::Active);
    }
}
