use serde::{Deserialize, Serialize};

// ============================================================================
// Entity Records
// ============================================================================
//
// The nine record types persisted by the bridge, one per collection. Records
// are stored as schemaless JSON documents; these structs are the typed surface
// the facade wrappers expose. The `id` field is assigned by the store on
// create — any caller-supplied value is replaced.
//
// ============================================================================

/// A network relay node used for media routing.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Router {
    #[serde(default)]
    pub id: String,
    pub url: String,
    pub port: u16,
}

/// A participant account. `stage_id`, when set, names the stage the user is
/// currently active on.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stage_id: Option<String>,
}

/// A physical or software endpoint owned by a user. `mac` is only present for
/// hardware devices.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Device {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub can_audio: bool,
    #[serde(default)]
    pub can_video: bool,
    #[serde(default)]
    pub send_audio: bool,
    #[serde(default)]
    pub send_video: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProducerKind {
    #[default]
    Audio,
    Video,
}

/// A media-sending endpoint bound to a device.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Producer {
    #[serde(default)]
    pub id: String,
    pub device_id: String,
    pub user_id: String,
    #[serde(default)]
    pub router_id: Option<String>,
    #[serde(default)]
    pub kind: ProducerKind,
}

/// A virtual room containing groups of collaborating users.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Stage {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// User ids with administrative rights on this stage.
    #[serde(default)]
    pub admins: Vec<String>,
}

/// A sub-room inside a stage.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Group {
    #[serde(default)]
    pub id: String,
    pub stage_id: String,
    pub name: String,
}

/// Stage-wide default volume for a group.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GroupVolume {
    #[serde(default)]
    pub id: String,
    pub group_id: String,
    #[serde(default)]
    pub volume: f64,
}

/// Membership of a user inside a group. Unique per (group, user) by
/// convention; the bridge itself does not enforce referential integrity.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GroupUser {
    #[serde(default)]
    pub id: String,
    pub group_id: String,
    pub user_id: String,
}

/// Per-listener override of another member's volume. `user_id` is the
/// listening user, `group_user_id` the membership being adjusted.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GroupUserVolume {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub group_user_id: String,
    #[serde(default)]
    pub volume: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_kind_serializes_lowercase() {
        let producer = Producer {
            device_id: "d1".into(),
            user_id: "u1".into(),
            kind: ProducerKind::Video,
            ..Default::default()
        };

        let json = serde_json::to_value(&producer).unwrap();
        assert_eq!(json["kind"], "video");

        let back: Producer = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, ProducerKind::Video);
    }

    #[test]
    fn records_tolerate_missing_optional_fields() {
        let user: User = serde_json::from_value(serde_json::json!({
            "name": "Ada"
        }))
        .unwrap();

        assert_eq!(user.name, "Ada");
        assert!(user.id.is_empty());
        assert!(user.stage_id.is_none());
    }
}
