use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// Contact priority, stored and serialized as 1 (primary), 2 (secondary) or 3 (other).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub enum ContactPriority {
    Primary,
    Secondary,
    Other,
}

impl TryFrom<u8> for ContactPriority {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ContactPriority::Primary),
            2 => Ok(ContactPriority::Secondary),
            3 => Ok(ContactPriority::Other),
            other => Err(anyhow!("unknown contact priority {other}")),
        }
    }
}

impl From<ContactPriority> for u8 {
    fn from(priority: ContactPriority) -> Self {
        match priority {
            ContactPriority::Primary => 1,
            ContactPriority::Secondary => 2,
            ContactPriority::Other => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub id: String,
    pub patient_id: String,
    pub name: String,
    pub relationship: String,
    pub phone: String,
    pub priority: ContactPriority,
    #[serde(default)]
    pub synced: bool,
}
