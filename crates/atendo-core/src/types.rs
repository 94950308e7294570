// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Atendo workspace.
//!
//! The wire-level types (`WireMessage`, `MessageContent`, `TransportEvent`)
//! model what the external protocol library delivers. `MessageContent` is a
//! closed enum: unrecognized payload shapes land in
//! [`MessageContent::Unrecognized`] so that new upstream message types fail
//! loudly instead of silently producing empty bodies.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a tenant connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Uninitialized,
    Qrcode,
    Connecting,
    Connected,
    Pending,
    Disconnected,
}

/// Status of a conversation ticket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Pending,
    Open,
    Closed,
}

/// Presence state reported by the messaging network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Available,
    Unavailable,
    Composing,
    Recording,
    Paused,
}

/// Close status codes the transport reports on `ConnectionUpdate::Close`.
pub mod close_code {
    /// Authentication rejected by the remote service (banned or revoked).
    pub const FORBIDDEN: u16 = 403;
    /// Explicit logout from the paired device.
    pub const LOGGED_OUT: u16 = 401;
}

/// Key identifying a protocol message on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireKey {
    pub id: String,
    pub remote_jid: String,
    pub from_me: bool,
    #[serde(default)]
    pub participant: Option<String>,
}

/// Reference to downloadable end-to-end-encrypted media.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaRef {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub direct_path: Option<String>,
    #[serde(default)]
    pub media_key: Option<Vec<u8>>,
    pub mimetype: String,
    #[serde(default)]
    pub file_length: Option<u64>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub thumbnail_direct_path: Option<String>,
}

/// Media class used when requesting a download from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum MediaKind {
    Audio,
    Video,
    Image,
    Document,
    ThumbnailVideo,
    ThumbnailImage,
    ThumbnailDocument,
    ThumbnailLink,
}

/// One entry of a shared contact card payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcardEntry {
    pub display_name: String,
    pub vcard: String,
}

/// Reply-context metadata attached to a wire message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireContext {
    #[serde(default)]
    pub stanza_id: Option<String>,
    #[serde(default)]
    pub participant: Option<String>,
    #[serde(default)]
    pub quoted: Option<Box<MessageContent>>,
}

/// The content-type union of inbound protocol payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MessageContent {
    Conversation {
        text: String,
    },
    ExtendedText {
        text: String,
        #[serde(default)]
        thumbnail: Option<MediaRef>,
    },
    Image {
        media: MediaRef,
        #[serde(default)]
        caption: Option<String>,
    },
    Video {
        media: MediaRef,
        #[serde(default)]
        caption: Option<String>,
    },
    Audio {
        media: MediaRef,
    },
    Sticker {
        media: MediaRef,
    },
    Document {
        media: MediaRef,
        #[serde(default)]
        caption: Option<String>,
    },
    DocumentWithCaption {
        media: MediaRef,
        #[serde(default)]
        caption: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        jpeg_thumbnail: Option<Vec<u8>>,
    },
    LiveLocation {
        latitude: f64,
        longitude: f64,
    },
    ContactCard {
        display_name: String,
        vcard: String,
    },
    ContactsArray {
        contacts: Vec<VcardEntry>,
    },
    Template {
        #[serde(default)]
        content_text: Option<String>,
        #[serde(default)]
        media: Option<MediaRef>,
    },
    Buttons {
        #[serde(default)]
        content_text: Option<String>,
    },
    ButtonsResponse {
        selected_id: String,
    },
    List {
        #[serde(default)]
        description: Option<String>,
    },
    ListResponse {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        selected_row_id: Option<String>,
    },
    TemplateButtonReply {
        selected_id: String,
    },
    Reaction {
        #[serde(default)]
        text: Option<String>,
        key: WireKey,
    },
    /// An edit delivered as a protocol message: `key` names the edited
    /// message, `content` carries its replacement payload.
    Edited {
        key: WireKey,
        content: Box<MessageContent>,
    },
    /// A revoke delivered as a protocol message: `key` names the deleted
    /// message.
    Deleted {
        key: WireKey,
    },
    ViewOnce {
        content: Box<MessageContent>,
    },
    Ephemeral {
        content: Box<MessageContent>,
    },
    /// Fallback for payload shapes this build does not know. Handlers must
    /// log these as a new-type alarm, never drop them silently.
    Unrecognized {
        type_name: String,
    },
}

impl MessageContent {
    /// Short name of the payload shape, used in logs and placeholder bodies.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Conversation { .. } => "conversation",
            Self::ExtendedText { .. } => "extendedTextMessage",
            Self::Image { .. } => "imageMessage",
            Self::Video { .. } => "videoMessage",
            Self::Audio { .. } => "audioMessage",
            Self::Sticker { .. } => "stickerMessage",
            Self::Document { .. } => "documentMessage",
            Self::DocumentWithCaption { .. } => "documentWithCaptionMessage",
            Self::Location { .. } => "locationMessage",
            Self::LiveLocation { .. } => "liveLocationMessage",
            Self::ContactCard { .. } => "contactMessage",
            Self::ContactsArray { .. } => "contactsArrayMessage",
            Self::Template { .. } => "templateMessage",
            Self::Buttons { .. } => "buttonsMessage",
            Self::ButtonsResponse { .. } => "buttonsResponseMessage",
            Self::List { .. } => "listMessage",
            Self::ListResponse { .. } => "listResponseMessage",
            Self::TemplateButtonReply { .. } => "templateButtonReplyMessage",
            Self::Reaction { .. } => "reactionMessage",
            Self::Edited { .. } => "editedMessage",
            Self::Deleted { .. } => "protocolMessage",
            Self::ViewOnce { .. } => "viewOnceMessage",
            Self::Ephemeral { .. } => "ephemeralMessage",
            Self::Unrecognized { type_name } => type_name,
        }
    }
}

/// Stub types attached to content-less protocol notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StubType {
    Revoke,
    E2eDeviceChanged,
    E2eIdentityChanged,
    Ciphertext,
    Other(String),
}

/// One inbound (or echoed outbound) protocol message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireMessage {
    pub key: WireKey,
    #[serde(default)]
    pub push_name: Option<String>,
    /// Delivery-acknowledgement level at upsert time.
    #[serde(default)]
    pub ack: i64,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub context: Option<WireContext>,
    #[serde(default)]
    pub stub: Option<StubType>,
}

/// Connection-state transition reported by the transport.
#[derive(Debug, Clone)]
pub enum ConnectionUpdate {
    /// A fresh QR pairing challenge.
    Qr(String),
    /// The connection is open and authenticated.
    Open,
    /// The connection closed with the given status code.
    Close { status_code: u16 },
}

/// A delivery-acknowledgement update for a previously seen message.
#[derive(Debug, Clone)]
pub struct AckUpdate {
    pub key: WireKey,
    pub ack: i64,
}

/// A presence update for a remote chat.
#[derive(Debug, Clone)]
pub struct PresenceUpdate {
    pub remote_jid: String,
    pub presence: Presence,
}

/// Metadata describing a group chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub jid: String,
    pub subject: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

/// The connection's own identity once paired.
#[derive(Debug, Clone, Default)]
pub struct TransportIdentity {
    /// Primary account jid.
    pub jid: String,
    /// Alternate linked-device id, when the account has one.
    pub lid: Option<String>,
    pub name: Option<String>,
}

/// Events emitted by the transport's per-connection stream.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connection(ConnectionUpdate),
    /// Updated credential material that must be persisted atomically.
    CredsUpdate(serde_json::Value),
    MessagesUpsert(Vec<WireMessage>),
    MessagesUpdate(Vec<AckUpdate>),
    Presence(PresenceUpdate),
    GroupsUpsert(Vec<GroupMetadata>),
    GroupUpdate { jid: String },
    GroupParticipantsUpdate { jid: String },
}
