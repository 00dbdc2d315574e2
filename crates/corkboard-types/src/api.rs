use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::Visibility;

// -- JWT Claims --

/// JWT claims shared across corkboard-api (REST middleware) and the gateway
/// upgrade in corkboard-server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) so a patch can clear a nullable column.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// -- Sticky notes --

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStickyNoteRequest {
    #[serde(default)]
    pub folder_id: Option<Uuid>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_text: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub note_type: Option<String>,
    #[serde(default)]
    pub type_data: Option<serde_json::Value>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub viewer_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub editor_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub pinned: Option<bool>,
}

/// Partial update. Only supplied fields change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStickyNoteRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub folder_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_text: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub note_type: Option<String>,
    #[serde(default)]
    pub type_data: Option<serde_json::Value>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default, deserialize_with = "double_option")]
    pub viewer_ids: Option<Option<Vec<Uuid>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub editor_ids: Option<Option<Vec<Uuid>>>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub pinned: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushStickyNoteRequest {
    #[serde(default)]
    pub target_user_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct PushStickyNoteResponse {
    pub note_id: Uuid,
    pub target_user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStickyNoteStateRequest {
    #[serde(default)]
    pub is_open: Option<bool>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub minimized: Option<bool>,
    #[serde(default)]
    pub z_index: Option<i64>,
}

// -- Folders --

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFolderRequest {
    /// Required; validated by the service so both entry paths reject it alike.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub order_index: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateFolderRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
    #[serde(default)]
    pub order_index: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let absent: UpdateStickyNoteRequest = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert_eq!(absent.folder_id, None);
        assert_eq!(absent.title.as_deref(), Some("x"));

        let cleared: UpdateStickyNoteRequest =
            serde_json::from_str(r#"{"folder_id":null}"#).unwrap();
        assert_eq!(cleared.folder_id, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateStickyNoteRequest =
            serde_json::from_value(serde_json::json!({ "folder_id": id })).unwrap();
        assert_eq!(set.folder_id, Some(Some(id)));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let res = serde_json::from_str::<UpdateStickyNoteRequest>(r#"{"channel_id":"nope"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn folder_name_defaults_to_empty() {
        let req: CreateFolderRequest = serde_json::from_str("{}").unwrap();
        assert!(req.name.is_empty());
    }
}
