//! Cross-process change propagation.
//!
//! The `reference_lists` table trigger publishes `<establishment>:<version>` on the
//! `reference_list_changed` channel. Commits made by this process already refreshed the
//! access layer through the store hook; this listener covers commits made elsewhere.

use crate::services::ReferenceListAccess;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const CHANGE_CHANNEL: &str = "reference_list_changed";

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Split a notification payload into establishment id and version.
///
/// The establishment id may itself contain ':'; the version is after the last one.
pub fn parse_payload(payload: &str) -> Option<(&str, u64)> {
    let (establishment_id, version) = payload.rsplit_once(':')?;
    if establishment_id.is_empty() {
        return None;
    }
    Some((establishment_id, version.parse().ok()?))
}

/// Listen for committed versions and refresh the access layer when it holds older state.
///
/// Reconnects after a short delay on connection errors; exits once the pool is closed.
pub fn spawn_change_listener(pool: PgPool, access: Arc<ReferenceListAccess>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if pool.is_closed() {
                break;
            }

            let mut listener = match sqlx::postgres::PgListener::connect_with(&pool).await {
                Ok(l) => l,
                Err(e) => {
                    if pool.is_closed() {
                        break;
                    }
                    tracing::warn!("Reference list listener connect failed: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            if let Err(e) = listener.listen(CHANGE_CHANNEL).await {
                tracing::warn!("Reference list listener subscribe failed: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }

            tracing::info!("Reference list listener started (channel '{}')", CHANGE_CHANNEL);

            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        let Some((establishment_id, version)) =
                            parse_payload(notification.payload())
                        else {
                            tracing::warn!(
                                "Ignoring malformed reference list notification '{}'",
                                notification.payload()
                            );
                            continue;
                        };

                        if !access.needs_refresh(establishment_id, version) {
                            continue;
                        }
                        if let Err(e) = access.refresh(establishment_id).await {
                            tracing::warn!(
                                establishment_id = establishment_id,
                                version = version,
                                "Failed to refresh reference lists: {}",
                                e
                            );
                            access.invalidate(establishment_id);
                        }
                    }
                    Err(e) => {
                        if pool.is_closed() {
                            break;
                        }
                        tracing::warn!("Reference list listener error: {}", e);
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_establishment_and_version() {
        assert_eq!(parse_payload("hotel-paris:12"), Some(("hotel-paris", 12)));
        assert_eq!(parse_payload("group:hotel:3"), Some(("group:hotel", 3)));
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert_eq!(parse_payload("hotel-paris"), None);
        assert_eq!(parse_payload(":4"), None);
        assert_eq!(parse_payload("hotel-paris:v4"), None);
    }
}
