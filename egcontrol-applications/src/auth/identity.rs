//! User Identity
//!
//! The authenticated user as the rest of the application sees it: the stored
//! user document without its password and revision.

use egcontrol_core::Document;
use serde::{Deserialize, Serialize};

/// Role classification; the only authorization signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can manage users
    Admin,
    /// Can register and search records
    #[default]
    User,
}

impl Role {
    /// Role as read from a stored document: anything other than `admin` is a plain user
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some(raw) if raw.trim().eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" | "usuario" => Ok(Role::User),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// User identity information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    /// Store document id
    pub id: String,
    /// Display name, copied into every record the user enters
    pub name: String,
    pub email: String,
    /// Work shift label
    pub shift: String,
    pub role: Role,
}

impl UserIdentity {
    /// Build an identity from a `users` document
    pub fn from_document(doc: &Document) -> Self {
        let text = |field: &str| doc.str_field(field).unwrap_or_default().trim().to_string();
        Self {
            id: doc.id.clone(),
            name: text("name"),
            email: text("email"),
            shift: text("shift"),
            role: Role::from_stored(doc.str_field("role")),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Get user display string
    pub fn display_string(&self) -> String {
        format!("{} <{}> ({})", self.name, self.email, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_from_stored() {
        assert_eq!(Role::from_stored(Some("admin")), Role::Admin);
        assert_eq!(Role::from_stored(Some(" Admin ")), Role::Admin);
        assert_eq!(Role::from_stored(Some("usuario")), Role::User);
        assert_eq!(Role::from_stored(Some("supervisor")), Role::User);
        assert_eq!(Role::from_stored(None), Role::User);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("usuario".parse::<Role>(), Ok(Role::User));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_identity_from_document_defaults_role() {
        let fields = match json!({
            "name": " Ana ",
            "email": "ana@plant.com",
            "shift": "A",
            "password": "secret"
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let identity = UserIdentity::from_document(&Document::new("u1", fields));

        assert_eq!(identity.id, "u1");
        assert_eq!(identity.name, "Ana");
        assert_eq!(identity.role, Role::User);
        assert!(!identity.is_admin());
    }
}
