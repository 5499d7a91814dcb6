use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::token::{ApplicationId, Token};

pub mod store;

/// Version of the [SessionRecord] layout written by this crate.
pub const SESSION_RECORD_VERSION: u32 = 1;

/// Authentication state used to talk to the Glowmarkt API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    token: Option<Token>,
    application_id: ApplicationId,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        token: Option<Token>,
        application_id: ApplicationId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            token,
            application_id,
            expires_at,
        }
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.application_id
    }

    /// Expiration reported by the service when the token was issued, if known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| exp.lt(&Utc::now()))
    }

    /// Snapshot of the session ready to be persisted.
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            version: SESSION_RECORD_VERSION,
            token: self.token.clone(),
            application_id: self.application_id.clone(),
            expires_at: self.expires_at,
            saved_at: Utc::now(),
        }
    }
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Session::new(record.token, record.application_id, record.expires_at)
    }
}

/// On-disk representation of a [Session].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionRecord {
    pub version: u32,
    pub token: Option<Token>,
    pub application_id: ApplicationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub saved_at: DateTime<Utc>,
}
