// Envelope - the method-tagged unit exchanged after authentication
//
// On the wire an envelope is a compact JSON object:
//
//     {"method":"DECLARE_FEED_KNOWN","feedKey":"news-1","subscribed":true}
//
// Unknown extra fields are ignored so newer peers can add them.

use crate::storage::{Feed, FeedType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid fields for {method}: {reason}")]
    InvalidFields { method: Method, reason: String },

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),
}

/// Methods understood by the feed synchronization protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    DeclareFeedKnown,
    InquireFeedDetails,
    AnswerFeedQuery,
    EndPhaseOne,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::DeclareFeedKnown => "DECLARE_FEED_KNOWN",
            Method::InquireFeedDetails => "INQUIRE_FEED_DETAILS",
            Method::AnswerFeedQuery => "ANSWER_FEED_QUERY",
            Method::EndPhaseOne => "END_PHASE_ONE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DECLARE_FEED_KNOWN" => Ok(Method::DeclareFeedKnown),
            "INQUIRE_FEED_DETAILS" => Ok(Method::InquireFeedDetails),
            "ANSWER_FEED_QUERY" => Ok(Method::AnswerFeedQuery),
            "END_PHASE_ONE" => Ok(Method::EndPhaseOne),
            other => Err(CodecError::UnknownMethod(other.to_string())),
        }
    }
}

/// A decoded protocol message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    /// Sender knows `feed_key`; `subscribed` is the sender's own interest
    #[serde(rename_all = "camelCase")]
    DeclareFeedKnown { feed_key: String, subscribed: bool },

    /// Sender asks for the full metadata of `feed_key`
    #[serde(rename_all = "camelCase")]
    InquireFeedDetails { feed_key: String },

    /// Authoritative metadata; `subscribed` is the answering peer's interest
    #[serde(rename_all = "camelCase")]
    AnswerFeedQuery {
        feed_key: String,
        subscribed: bool,
        host: String,
        port: String,
        #[serde(rename = "type")]
        feed_type: FeedType,
    },

    /// Sender finished declaring its known feeds for this round
    EndPhaseOne {},
}

impl Envelope {
    pub fn method(&self) -> Method {
        match self {
            Envelope::DeclareFeedKnown { .. } => Method::DeclareFeedKnown,
            Envelope::InquireFeedDetails { .. } => Method::InquireFeedDetails,
            Envelope::AnswerFeedQuery { .. } => Method::AnswerFeedQuery,
            Envelope::EndPhaseOne {} => Method::EndPhaseOne,
        }
    }

    pub fn declare(feed_key: &str, subscribed: bool) -> Self {
        Envelope::DeclareFeedKnown {
            feed_key: feed_key.to_string(),
            subscribed,
        }
    }

    pub fn inquire(feed_key: &str) -> Self {
        Envelope::InquireFeedDetails {
            feed_key: feed_key.to_string(),
        }
    }

    /// Answer for a resolved feed; `None` if the feed lacks details
    pub fn answer(feed: &Feed) -> Option<Self> {
        Some(Envelope::AnswerFeedQuery {
            feed_key: feed.key.clone(),
            subscribed: feed.subscribed,
            host: feed.host.clone()?,
            port: feed.port.clone()?,
            feed_type: feed.feed_type?,
        })
    }

    pub fn end_phase_one() -> Self {
        Envelope::EndPhaseOne {}
    }

    /// Feed key the envelope refers to, if any
    pub fn feed_key(&self) -> Option<&str> {
        match self {
            Envelope::DeclareFeedKnown { feed_key, .. }
            | Envelope::InquireFeedDetails { feed_key }
            | Envelope::AnswerFeedQuery { feed_key, .. } => Some(feed_key.as_str()),
            Envelope::EndPhaseOne {} => None,
        }
    }

    /// Serialize to compact JSON
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::EncodeFailed(e.to_string()))
    }

    /// Parse compact JSON. The method is checked before the fields so a
    /// missing or unknown method is reported as such.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?;

        let method: Method = value
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::MalformedEnvelope("missing method field".to_string()))?
            .parse()?;

        serde_json::from_value(value).map_err(|e| CodecError::InvalidFields {
            method,
            reason: e.to_string(),
        })
    }
}
