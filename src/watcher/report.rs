use chrono::{DateTime, Utc};
use tracing::error;

use crate::db::{ActivityStore, StoreError};
use crate::moderation::ProfileLookup;
use crate::telegram::formatter::{format_elapsed, format_member_line};

/// One line per known member, least recently active first.
///
/// Members whose profile cannot be resolved are logged and left out.
pub async fn build_report(
    store: &dyn ActivityStore,
    profiles: &dyn ProfileLookup,
    now: DateTime<Utc>,
) -> Result<String, StoreError> {
    let records = store.list_all_sorted_by_activity()?;

    let mut lines = Vec::with_capacity(records.len());
    for record in records {
        let profile = match profiles.profile(record.member_id).await {
            Ok(p) => p,
            Err(e) => {
                error!(op = "profile", member_id = record.member_id, "chat by id failed: {e}");
                continue;
            }
        };

        let elapsed = format_elapsed(now.timestamp() - record.last_activity);
        lines.push(format_member_line(&profile, &elapsed));
    }

    Ok(lines.join("\n"))
}
