//! Request/response contract between the client surface and the engine

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use super::balance::BalanceSnapshot;
use super::result::{Error, Result};

/// Inbound request, tagged by `action`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    ForceRefresh,
    ValidateApiKey {
        #[serde(rename = "apiKey")]
        api_key: String,
    },
    GetBalance,
    SetApiKey {
        key: String,
    },
    SetRefreshInterval {
        #[serde(deserialize_with = "deserialize_interval")]
        interval: i64,
    },
}

impl Request {
    /// Every action name the engine understands
    pub const ACTIONS: &'static [&'static str] = &[
        "forceRefresh",
        "validateApiKey",
        "getBalance",
        "setApiKey",
        "setRefreshInterval",
    ];

    /// Parse a raw message
    ///
    /// An action name outside [`Request::ACTIONS`] is `UnknownAction`; a known
    /// action with bad fields is a `Validation` error.
    pub fn from_json(value: JsonValue) -> Result<Self> {
        let action = value
            .get("action")
            .and_then(|a| a.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::UnknownAction("<missing>".to_string()))?;

        if !Self::ACTIONS.contains(&action.as_str()) {
            return Err(Error::UnknownAction(action));
        }

        serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("invalid {} request: {}", action, e)))
    }

    pub fn action(&self) -> &'static str {
        match self {
            Request::ForceRefresh => "forceRefresh",
            Request::ValidateApiKey { .. } => "validateApiKey",
            Request::GetBalance => "getBalance",
            Request::SetApiKey { .. } => "setApiKey",
            Request::SetRefreshInterval { .. } => "setRefreshInterval",
        }
    }
}

/// Accept the interval as a number or a numeric string
fn deserialize_interval<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: JsonValue = Deserialize::deserialize(deserializer)?;
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| D::Error::custom("interval out of range")),
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| D::Error::custom(format!("invalid interval: {}", e))),
        _ => Err(D::Error::custom("expected number or string for interval")),
    }
}

/// Successful response payloads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// `forceRefresh`, `setApiKey`
    Balance(BalanceSnapshot),
    /// `validateApiKey`
    Validation { success: bool },
    /// `getBalance`
    BalanceState {
        balance: Option<BalanceSnapshot>,
        #[serde(rename = "hasApiKey")]
        has_api_key: bool,
    },
    /// `setRefreshInterval`
    Ack(bool),
}

/// What the caller receives: a response or `{ "error": message }`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Ok(Response),
    Err { error: String },
}

impl Reply {
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Err { .. })
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
    }
}

impl From<Result<Response>> for Reply {
    fn from(result: Result<Response>) -> Self {
        match result {
            Ok(response) => Reply::Ok(response),
            Err(e) => Reply::Err {
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_known_actions() {
        assert_eq!(
            Request::from_json(json!({"action": "forceRefresh"})).unwrap(),
            Request::ForceRefresh
        );
        assert_eq!(
            Request::from_json(json!({"action": "validateApiKey", "apiKey": "sk-1"})).unwrap(),
            Request::ValidateApiKey {
                api_key: "sk-1".to_string()
            }
        );
        assert_eq!(
            Request::from_json(json!({"action": "setApiKey", "key": "sk-2"})).unwrap(),
            Request::SetApiKey {
                key: "sk-2".to_string()
            }
        );
        assert_eq!(
            Request::from_json(json!({"action": "setRefreshInterval", "interval": "15"})).unwrap(),
            Request::SetRefreshInterval { interval: 15 }
        );
    }

    #[test]
    fn test_unknown_action() {
        let err = Request::from_json(json!({"action": "selfDestruct"})).unwrap_err();
        assert!(matches!(err, Error::UnknownAction(ref a) if a == "selfDestruct"));

        let err = Request::from_json(json!({"key": "sk"})).unwrap_err();
        assert!(matches!(err, Error::UnknownAction(_)));
    }

    #[test]
    fn test_missing_field_is_validation_error() {
        let err = Request::from_json(json!({"action": "setApiKey"})).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_action_names_match_tags() {
        for request in [
            Request::ForceRefresh,
            Request::GetBalance,
            Request::SetApiKey { key: "k".into() },
            Request::ValidateApiKey { api_key: "k".into() },
            Request::SetRefreshInterval { interval: 3 },
        ] {
            let value = serde_json::to_value(&request).unwrap();
            assert_eq!(value["action"], request.action());
        }
    }

    #[test]
    fn test_reply_shapes() {
        let reply: Reply = Err::<Response, _>(Error::CredentialMissing).into();
        assert_eq!(reply.to_json(), json!({"error": "API key is not set"}));

        let reply = Reply::Ok(Response::BalanceState {
            balance: None,
            has_api_key: false,
        });
        assert_eq!(reply.to_json(), json!({"balance": null, "hasApiKey": false}));

        let reply = Reply::Ok(Response::Validation { success: true });
        assert_eq!(reply.to_json(), json!({"success": true}));
    }
}
