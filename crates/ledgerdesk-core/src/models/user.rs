use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A staff account as listed by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    #[serde(rename = "userFirstName", default)]
    pub user_first_name: String,
    #[serde(rename = "userLastName", default)]
    pub user_last_name: String,
}

impl UserAccount {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.user_first_name, self.user_last_name)
            .trim()
            .to_string()
    }
}

/// Body for registering or updating a user
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub email: String,
    #[serde(rename = "userFirstName")]
    pub user_first_name: String,
    #[serde(rename = "userLastName")]
    pub user_last_name: String,
    #[serde(rename = "userPassword")]
    pub user_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordChange {
    pub password: String,
}

/// The signed-in identity, as kept in session storage under `user`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub email: String,
    #[serde(rename = "userFirstName", skip_serializing_if = "Option::is_none")]
    pub user_first_name: Option<String>,
    #[serde(rename = "userLastName", skip_serializing_if = "Option::is_none")]
    pub user_last_name: Option<String>,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
}

impl UserIdentity {
    /// Parse a stored identity record, accepting the field spellings the
    /// server has used over time. Returns `None` for anything that is not
    /// a JSON object.
    pub fn from_stored(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let object = value.as_object()?;

        let text = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .filter_map(|key| object.get(*key))
                .filter_map(|v| match v {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .next()
        };

        Some(Self {
            user_id: text(&["userId", "id"]),
            email: text(&["email", "Email"]).unwrap_or_default(),
            user_first_name: text(&["userFirstName", "firstName"]),
            user_last_name: text(&["userLastName", "lastName"]),
            is_admin: object
                .get("isAdmin")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    pub fn display_name(&self) -> String {
        let name = [self.user_first_name.as_deref(), self.user_last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_normalizes_alternate_spellings() {
        let identity =
            UserIdentity::from_stored(r#"{"Email": "a@b.c", "firstName": "Ada", "lastName": "Lovelace", "userId": 7}"#)
                .unwrap();
        assert_eq!(identity.email, "a@b.c");
        assert_eq!(identity.user_id.as_deref(), Some("7"));
        assert_eq!(identity.display_name(), "Ada Lovelace");
        assert!(!identity.is_admin);
    }

    #[test]
    fn test_identity_prefers_canonical_fields() {
        let identity = UserIdentity::from_stored(
            r#"{"email": "new@b.c", "Email": "old@b.c", "userFirstName": "Grace", "isAdmin": true}"#,
        )
        .unwrap();
        assert_eq!(identity.email, "new@b.c");
        assert_eq!(identity.display_name(), "Grace");
        assert!(identity.is_admin);
    }

    #[test]
    fn test_identity_rejects_garbage() {
        assert!(UserIdentity::from_stored("not json").is_none());
        assert!(UserIdentity::from_stored("[]").is_none());
    }

    #[test]
    fn test_identity_round_trips_through_storage_form() {
        let identity = UserIdentity {
            user_id: Some("u-1".into()),
            email: "x@y.z".into(),
            ..Default::default()
        };
        let stored = serde_json::to_string(&identity).unwrap();
        assert_eq!(UserIdentity::from_stored(&stored), Some(identity));
    }

    #[test]
    fn test_user_account_full_name() {
        let user: UserAccount =
            serde_json::from_str(r#"{"userId": "1", "email": "a@b.c", "userFirstName": "Ada"}"#).unwrap();
        assert_eq!(user.full_name(), "Ada");
    }
}
