//! Binary attachments, uploaded base64-encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::backend::{require_id, Backend};
use crate::error::Error;

pub trait AttachmentApi: Backend {
    /// Upload `content` and return the attachment id. `metadata` keys are
    /// merged into the payload and take precedence over the base fields.
    fn send_attachment(
        &self,
        name: &str,
        mime_type: &str,
        content: &[u8],
        metadata: &Map<String, Value>,
    ) -> Result<String, Error> {
        let mut payload = Map::new();
        payload.insert("name".into(), name.into());
        payload.insert("mime_type".into(), mime_type.into());
        payload.insert("content_base64".into(), STANDARD.encode(content).into());
        for (key, value) in metadata {
            payload.insert(key.clone(), value.clone());
        }
        let body = self.post("/attachments", &Value::Object(payload))?;
        require_id(&body, "attachment")
    }
}

impl<B: Backend + ?Sized> AttachmentApi for B {}
