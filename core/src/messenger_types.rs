/// Shared types for the messaging layer
use serde::{Deserialize, Serialize};

/// One direct message between two identities.
///
/// The backend speaks MongoDB extended JSON: identities may arrive as
/// `{"$oid": "..."}` and timestamps as `{"$date": ...}`. Both plain and
/// extended forms are accepted; the extended form is written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id, absent for messages composed locally
    #[serde(
        rename = "_id",
        default,
        skip_serializing_if = "Option::is_none",
        with = "wire::opt_oid"
    )]
    pub id: Option<String>,
    #[serde(with = "wire::oid")]
    pub sender_id: String,
    #[serde(with = "wire::oid")]
    pub recipient_id: String,
    pub body: String,
    /// Creation time in epoch milliseconds
    #[serde(with = "wire::date")]
    pub created_at: i64,
}

impl Message {
    /// Compose a message stamped with the current time
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            body: body.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// The other participant, seen from `self_id`
    pub fn counterpart_of(&self, self_id: &str) -> &str {
        if self.sender_id == self_id {
            &self.recipient_id
        } else {
            &self.sender_id
        }
    }

    pub fn involves(&self, identity: &str) -> bool {
        self.sender_id == identity || self.recipient_id == identity
    }

    /// Whether both values denote the same message. Server ids win when both
    /// sides carry one; a locally composed message has none yet.
    pub fn same_as(&self, other: &Message) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => {
                self.sender_id == other.sender_id
                    && self.recipient_id == other.recipient_id
                    && self.created_at == other.created_at
                    && self.body == other.body
            }
        }
    }
}

/// Display attributes of a counterpart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CounterpartProfile {
    /// Display for a first-contact sender: only the raw identity is known
    pub fn placeholder(identity: &str, avatar: Option<&str>) -> Self {
        Self {
            name: identity.to_string(),
            image: avatar.map(str::to_string),
        }
    }
}

/// Summary of one conversation (for the conversation list)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(rename = "otherId", deserialize_with = "wire::oid::deserialize")]
    pub counterpart_id: String,
    #[serde(rename = "otherUser")]
    pub counterpart: CounterpartProfile,
    #[serde(rename = "latestMessage")]
    pub latest_message: Message,
    /// Set when a message arrived that the user has not looked at yet
    #[serde(rename = "new", default)]
    pub unseen: bool,
}

/// State changes pushed to observers of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessengerEvent {
    /// The live channel subscription is up
    Connected { channel: String },
    /// The live channel subscription was released
    Disconnected { channel: String },
    /// The conversation index was (re)loaded from the backend
    ConversationsLoaded { count: usize },
    /// A summary was created or changed by a live message
    ConversationUpdated { summary: ConversationSummary },
    /// History for the open conversation was committed
    ThreadOpened {
        counterpart_id: String,
        message_count: usize,
    },
    /// A message was appended to the open conversation
    ThreadAppended {
        counterpart_id: String,
        message: Message,
    },
}

mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OidRepr {
        Extended {
            #[serde(rename = "$oid")]
            oid: String,
        },
        Plain(String),
    }

    impl OidRepr {
        fn into_string(self) -> String {
            match self {
                OidRepr::Extended { oid } => oid,
                OidRepr::Plain(s) => s,
            }
        }
    }

    #[derive(Serialize)]
    struct OidRef<'a> {
        #[serde(rename = "$oid")]
        oid: &'a str,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DateRepr {
        Extended {
            #[serde(rename = "$date")]
            date: DateValue,
        },
        Value(DateValue),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DateValue {
        Millis(i64),
        Text(String),
    }

    #[derive(Serialize)]
    struct DateRef {
        #[serde(rename = "$date")]
        date: i64,
    }

    fn parse_timestamp(text: &str) -> Result<i64, String> {
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
            return Ok(dt.timestamp_millis());
        }
        // Naive ISO strings are UTC on the backend
        chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc().timestamp_millis())
            .map_err(|e| format!("invalid timestamp {:?}: {}", text, e))
    }

    pub mod oid {
        use super::{OidRef, OidRepr};
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S: Serializer>(id: &str, serializer: S) -> Result<S::Ok, S::Error> {
            OidRef { oid: id }.serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
            Ok(OidRepr::deserialize(deserializer)?.into_string())
        }
    }

    pub mod opt_oid {
        use super::{OidRef, OidRepr};
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S: Serializer>(
            id: &Option<String>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match id {
                Some(id) => OidRef { oid: id }.serialize(serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<String>, D::Error> {
            Ok(Option::<OidRepr>::deserialize(deserializer)?.map(OidRepr::into_string))
        }
    }

    pub mod date {
        use super::{parse_timestamp, DateRef, DateRepr, DateValue};
        use serde::de::Error as _;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S: Serializer>(millis: &i64, serializer: S) -> Result<S::Ok, S::Error> {
            DateRef { date: *millis }.serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
            let value = match DateRepr::deserialize(deserializer)? {
                DateRepr::Extended { date } => date,
                DateRepr::Value(value) => value,
            };
            match value {
                DateValue::Millis(millis) => Ok(millis),
                DateValue::Text(text) => parse_timestamp(&text).map_err(D::Error::custom),
            }
        }
    }
}
