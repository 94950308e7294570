// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content classification: maps the protocol payload union to plain-text
//! bodies, media references, and filtering decisions.
//!
//! Unknown payload shapes must never be dropped silently: they produce a
//! placeholder body and a warning, so new upstream protocol additions fail
//! loudly.

use base64::Engine;
use serde_json::json;
use tracing::warn;

use atendo_core::types::{MediaRef, MessageContent, StubType, WireMessage};

/// Plain-text body for a payload.
pub fn body_of(content: Option<&MessageContent>) -> String {
    let Some(content) = content else {
        return String::new();
    };

    match content {
        MessageContent::Conversation { text } => text.clone(),
        MessageContent::ExtendedText { text, .. } => text.clone(),
        MessageContent::Image { caption, .. } => caption.clone().unwrap_or_default(),
        MessageContent::Video { caption, .. } => caption.clone().unwrap_or_default(),
        MessageContent::Audio { .. } => "\u{1F50A}".to_string(),
        MessageContent::Sticker { .. } => "sticker".to_string(),
        MessageContent::Document { caption, .. } => caption.clone().unwrap_or_default(),
        MessageContent::DocumentWithCaption { caption, .. } => {
            caption.clone().unwrap_or_default()
        }
        MessageContent::Location {
            latitude,
            longitude,
            jpeg_thumbnail,
        } => location_body(jpeg_thumbnail.as_deref(), *latitude, *longitude),
        MessageContent::LiveLocation {
            latitude,
            longitude,
        } => format!("Latitude: {latitude} - Longitude: {longitude}"),
        MessageContent::ContactCard {
            display_name,
            vcard,
        } => json!({
            "vcards": [{"displayName": display_name, "vcard": vcard}]
        })
        .to_string(),
        MessageContent::ContactsArray { contacts } => {
            let cards: Vec<_> = contacts
                .iter()
                .map(|c| json!({"displayName": c.display_name, "vcard": c.vcard}))
                .collect();
            json!({ "vcards": cards }).to_string()
        }
        MessageContent::Template { content_text, .. } => content_text
            .clone()
            .unwrap_or_else(|| "unsupported template message".to_string()),
        MessageContent::Buttons { content_text } => content_text.clone().unwrap_or_default(),
        MessageContent::ButtonsResponse { selected_id } => selected_id.clone(),
        MessageContent::List { description } => description.clone().unwrap_or_default(),
        MessageContent::ListResponse {
            title,
            selected_row_id,
        } => selected_row_id
            .clone()
            .or_else(|| title.clone())
            .unwrap_or_default(),
        MessageContent::TemplateButtonReply { selected_id } => selected_id.clone(),
        MessageContent::Reaction { text, .. } => {
            text.clone().unwrap_or_else(|| "reaction".to_string())
        }
        MessageContent::Edited { content, .. } => body_of(Some(content)),
        MessageContent::Deleted { .. } => String::new(),
        MessageContent::ViewOnce { content } | MessageContent::Ephemeral { content } => {
            body_of(Some(content))
        }
        MessageContent::Unrecognized { type_name } => {
            warn!(r#type = %type_name, "received unsupported message");
            format!("unsupported message: {type_name}")
        }
    }
}

/// A location body: inline thumbnail plus a maps link.
fn location_body(thumbnail: Option<&[u8]>, latitude: f64, longitude: f64) -> String {
    let Some(thumbnail) = thumbnail else {
        return String::new();
    };
    let b64 = base64::engine::general_purpose::STANDARD.encode(thumbnail);
    format!(
        "data:image/png;base64, {b64} | https://maps.google.com/maps?q={latitude}%2C{longitude}&z=17|{latitude}, {longitude} "
    )
}

/// The downloadable media reference of a payload, if any.
pub fn media_of(content: &MessageContent) -> Option<&MediaRef> {
    match content {
        MessageContent::Image { media, .. }
        | MessageContent::Video { media, .. }
        | MessageContent::Audio { media }
        | MessageContent::Sticker { media }
        | MessageContent::Document { media, .. }
        | MessageContent::DocumentWithCaption { media, .. } => Some(media),
        MessageContent::Template { media, .. } => media.as_ref(),
        MessageContent::ViewOnce { content } | MessageContent::Ephemeral { content } => {
            media_of(content)
        }
        _ => None,
    }
}

/// A media reference that carries a downloadable thumbnail.
pub fn thumbnail_of(content: &MessageContent) -> Option<&MediaRef> {
    if let MessageContent::ExtendedText {
        thumbnail: Some(thumbnail),
        ..
    } = content
    {
        return Some(thumbnail);
    }
    media_of(content).filter(|media| media.thumbnail_direct_path.is_some())
}

/// Peel ephemeral and view-once wrappers down to the payload itself.
pub fn unwrap_content(content: &MessageContent) -> &MessageContent {
    match content {
        MessageContent::ViewOnce { content } | MessageContent::Ephemeral { content } => {
            unwrap_content(content)
        }
        other => other,
    }
}

/// Whether the generic pipeline should process this event at all.
///
/// Broadcast-status traffic and unsupported protocol stubs are filtered;
/// unrecognized content types raise a new-type alarm and are filtered too.
pub fn is_processable(msg: &WireMessage) -> bool {
    if msg.key.remote_jid == "status@broadcast" {
        return false;
    }

    if let Some(stub) = &msg.stub {
        match stub {
            StubType::Revoke
            | StubType::E2eDeviceChanged
            | StubType::E2eIdentityChanged
            | StubType::Ciphertext => return false,
            StubType::Other(_) => {}
        }
    }

    let Some(content) = &msg.content else {
        return false;
    };

    if let MessageContent::Unrecognized { type_name } = unwrap_content(content) {
        warn!(
            r#type = %type_name,
            id = %msg.key.id,
            "unrecognized message type, skipping"
        );
        return false;
    }

    true
}

/// Chat-list preview: first 255 chars, newlines collapsed to spaces.
pub fn preview(body: &str) -> String {
    body.chars().take(255).map(|c| if c == '\n' { ' ' } else { c }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atendo_core::types::WireKey;

    fn text_message(text: &str) -> WireMessage {
        WireMessage {
            key: WireKey {
                id: "M1".into(),
                remote_jid: "5511999990000@s.whatsapp.net".into(),
                from_me: false,
                participant: None,
            },
            content: Some(MessageContent::Conversation { text: text.into() }),
            ..Default::default()
        }
    }

    #[test]
    fn text_bodies_pass_through() {
        assert_eq!(
            body_of(Some(&MessageContent::Conversation { text: "hi".into() })),
            "hi"
        );
        assert_eq!(
            body_of(Some(&MessageContent::ExtendedText {
                text: "linked".into(),
                thumbnail: None,
            })),
            "linked"
        );
    }

    #[test]
    fn audio_gets_the_speaker_placeholder() {
        let content = MessageContent::Audio {
            media: MediaRef {
                mimetype: "audio/ogg".into(),
                ..Default::default()
            },
        };
        assert_eq!(body_of(Some(&content)), "\u{1F50A}");
    }

    #[test]
    fn contact_card_serializes_vcards() {
        let content = MessageContent::ContactCard {
            display_name: "Alice".into(),
            vcard: "BEGIN:VCARD".into(),
        };
        let body = body_of(Some(&content));
        assert!(body.contains("\"displayName\":\"Alice\""));
    }

    #[test]
    fn location_embeds_thumbnail_and_maps_link() {
        let content = MessageContent::Location {
            latitude: -23.5,
            longitude: -46.6,
            jpeg_thumbnail: Some(vec![1, 2, 3]),
        };
        let body = body_of(Some(&content));
        assert!(body.starts_with("data:image/png;base64,"));
        assert!(body.contains("maps.google.com"));
    }

    #[test]
    fn unrecognized_produces_placeholder_body() {
        let content = MessageContent::Unrecognized {
            type_name: "pollCreationMessageV4".into(),
        };
        assert_eq!(
            body_of(Some(&content)),
            "unsupported message: pollCreationMessageV4"
        );
    }

    #[test]
    fn wrapped_content_unwraps_for_media_and_body() {
        let inner = MessageContent::Image {
            media: MediaRef {
                mimetype: "image/jpeg".into(),
                ..Default::default()
            },
            caption: Some("look".into()),
        };
        let wrapped = MessageContent::ViewOnce {
            content: Box::new(inner),
        };
        assert_eq!(body_of(Some(&wrapped)), "look");
        assert!(media_of(&wrapped).is_some());
    }

    #[test]
    fn broadcast_and_stubs_are_filtered() {
        let mut msg = text_message("hi");
        assert!(is_processable(&msg));

        msg.key.remote_jid = "status@broadcast".into();
        assert!(!is_processable(&msg));

        let mut msg = text_message("hi");
        msg.stub = Some(StubType::Ciphertext);
        assert!(!is_processable(&msg));

        let mut msg = text_message("hi");
        msg.content = Some(MessageContent::Unrecognized {
            type_name: "pollCreationMessageV4".into(),
        });
        assert!(!is_processable(&msg));

        let mut msg = text_message("hi");
        msg.content = None;
        assert!(!is_processable(&msg));
    }

    #[test]
    fn preview_truncates_and_collapses_newlines() {
        let long = "a\nb".repeat(200);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 255);
        assert!(!p.contains('\n'));
    }

    #[test]
    fn extended_text_thumbnail_is_detected() {
        let content = MessageContent::ExtendedText {
            text: "link".into(),
            thumbnail: Some(MediaRef {
                mimetype: "image/jpeg".into(),
                thumbnail_direct_path: Some("/t/abc".into()),
                media_key: Some(vec![1]),
                ..Default::default()
            }),
        };
        assert!(thumbnail_of(&content).is_some());
        assert!(media_of(&content).is_none());
    }
}
