// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quoted-message resolution.
//!
//! Replies carry the quoted message's id and payload in context metadata.
//! If the quoted message is already stored for this ticket it is linked;
//! otherwise a stand-in is materialized from the quoted payload itself
//! (one level deep), because the original may not exist in this ticket's
//! history at all.

use std::sync::Arc;

use tracing::warn;

use atendo_core::types::WireMessage;
use atendo_core::AtendoError;
use atendo_session::SessionHandle;
use atendo_storage::models::{Message, Ticket};
use atendo_storage::queries::messages;

use crate::body::{body_of, media_of};
use crate::media;
use crate::pipeline::MessagePipeline;

impl MessagePipeline {
    /// The stored message a reply points at, materializing a stand-in when
    /// it is missing from this ticket's history.
    pub(crate) async fn resolve_quoted(
        &self,
        session: &Arc<SessionHandle>,
        msg: &WireMessage,
        ticket: &Ticket,
    ) -> Result<Option<Message>, AtendoError> {
        let Some(context) = &msg.context else {
            return Ok(None);
        };
        let Some(quoted_id) = &context.stanza_id else {
            return Ok(None);
        };

        let scoped_id = format!("{quoted_id}-{}", ticket.id);
        if let Some(stored) =
            messages::find_quoted(&self.db, quoted_id, &scoped_id, ticket.id).await?
        {
            return Ok(Some(stored));
        }

        let (Some(quoted_content), Some(participant)) = (&context.quoted, &context.participant)
        else {
            return Ok(None);
        };

        // Materialize the quoted payload as if it were itself received.
        let body = body_of(Some(quoted_content));
        let from_me = session
            .jid()
            .map(|jid| *participant == jid)
            .unwrap_or(false);

        let mut media_url = None;
        let mut media_type = None;
        if let Some(media_ref) = media_of(quoted_content) {
            let kind = media::media_kind(&media_ref.mimetype);
            match media::download_media(
                session.transport.as_ref(),
                media_ref,
                kind,
                &self.config.media,
            )
            .await
            {
                Ok(downloaded) => {
                    media_type = Some(media::media_type_tag(&downloaded.mimetype));
                    match media::save_media(
                        &self.config.storage.media_dir,
                        ticket.tenant_id,
                        &downloaded,
                    )
                    .await
                    {
                        Ok(url) => media_url = Some(url),
                        Err(e) => warn!(error = %e, "failed to store quoted media"),
                    }
                }
                // The stand-in is still worth keeping without its media.
                Err(e) => warn!(error = %e, "failed to download quoted media"),
            }
        }

        let mut record = Message::blank(scoped_id, ticket.id, ticket.tenant_id);
        record.body = body;
        record.from_me = from_me;
        record.read = true;
        record.participant = Some(participant.clone());
        record.media_type = media_type;
        record.media_url = media_url;
        record.data_json = serde_json::to_string(quoted_content).ok();

        messages::upsert_message(&self.db, &record).await?;
        let stored = messages::get_message(&self.db, &record.id, ticket.id).await?;
        Ok(stored)
    }
}
