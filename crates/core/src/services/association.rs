//! Association manager.
//!
//! Tracks which dependent punishments a warning step caused, so they can be
//! paused, resumed and removed together with it. The links live on the
//! `active_warning` row as a JSON list of `"type:recordId"` strings.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use sanction_common::{AppError, AppResult};
use sanction_db::entities::{PunishmentType, active_warning};
use sanction_db::repositories::WarningRepository;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::{debug, warn};

/// A dependent punishment recorded against a warning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationLink {
    pub punishment_type: PunishmentType,
    pub record_id: String,
}

impl AssociationLink {
    /// Create a link.
    #[must_use]
    pub fn new(punishment_type: PunishmentType, record_id: impl Into<String>) -> Self {
        Self {
            punishment_type,
            record_id: record_id.into(),
        }
    }
}

impl fmt::Display for AssociationLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.punishment_type, self.record_id)
    }
}

impl FromStr for AssociationLink {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, record_id) = s
            .split_once(':')
            .ok_or_else(|| format!("missing ':' in association {s:?}"))?;
        if record_id.is_empty() {
            return Err(format!("empty record id in association {s:?}"));
        }
        Ok(Self {
            punishment_type: kind.parse()?,
            record_id: record_id.to_string(),
        })
    }
}

/// Parse a stored association list. Malformed entries are logged and skipped.
#[must_use]
pub fn parse_associations(raw: &str) -> Vec<AssociationLink> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let entries: Vec<String> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Unreadable association list, treating as empty");
            return Vec::new();
        }
    };
    entries
        .iter()
        .filter_map(|entry| match entry.parse() {
            Ok(link) => Some(link),
            Err(e) => {
                warn!(entry = %entry, error = %e, "Skipping malformed association");
                None
            }
        })
        .collect()
}

/// Serialize an association list for storage.
#[must_use]
pub fn serialize_associations(links: &[AssociationLink]) -> String {
    let entries: Vec<String> = links.iter().map(ToString::to_string).collect();
    serde_json::Value::from(entries).to_string()
}

/// Links of a stored warning step.
#[must_use]
pub fn links_of(warning: &active_warning::Model) -> Vec<AssociationLink> {
    parse_associations(&warning.associated_punishment_ids)
}

/// Association manager.
#[derive(Clone)]
pub struct AssociationManager {
    db: Arc<DatabaseConnection>,
}

impl AssociationManager {
    /// Create a new association manager.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record that `dependent_record_id` was applied because of the warning
    /// whose ledger record is `warning_record_id`.
    ///
    /// Read-modify-write of the stored list; concurrent links to the same
    /// warning are last-writer-wins.
    pub async fn link(
        &self,
        warning_record_id: &str,
        dependent_type: PunishmentType,
        dependent_record_id: &str,
    ) -> AppResult<()> {
        link_on(
            self.db.as_ref(),
            warning_record_id,
            AssociationLink::new(dependent_type, dependent_record_id),
        )
        .await
    }

    /// Links recorded against a warning, in insertion order.
    pub async fn associations(&self, warning_record_id: &str) -> AppResult<Vec<AssociationLink>> {
        let warning = WarningRepository::new(self.db.as_ref())
            .find_by_record_id(warning_record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Warning {warning_record_id} not found")))?;
        Ok(links_of(&warning))
    }

    /// Run `f` for every link of a warning.
    pub async fn for_each_association<F>(&self, warning_record_id: &str, mut f: F) -> AppResult<()>
    where
        F: FnMut(&AssociationLink),
    {
        for link in &self.associations(warning_record_id).await? {
            f(link);
        }
        Ok(())
    }
}

/// Append a link using the given connection.
async fn link_on<C: ConnectionTrait>(
    db: &C,
    warning_record_id: &str,
    link: AssociationLink,
) -> AppResult<()> {
    let warnings = WarningRepository::new(db);
    let warning = warnings
        .find_by_record_id(warning_record_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Warning {warning_record_id} not found")))?;

    let mut links = links_of(&warning);
    if links.contains(&link) {
        debug!(warning_record_id, link = %link, "Association already recorded");
        return Ok(());
    }
    links.push(link);

    warnings
        .set_associations(&warning.id, &serialize_associations(&links))
        .await?;
    debug!(warning_record_id, count = links.len(), "Association recorded");
    Ok(())
}
