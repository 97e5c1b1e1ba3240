// 🔗 Entity Resolver - parsed fragments → registry ids + links
//
// Teams resolve by (code, display name); participants by registry number when
// present, else by (first, last, gender, birth date). Every sighting writes
// the three link kinds idempotently. Runs against whatever connection or
// transaction the caller hands in.

use rusqlite::Connection;
use serde::Serialize;

use crate::audit::{AuditEntry, AuditKind};
use crate::entities::links::{link_meet_participant, link_meet_team, link_meet_team_participant};
use crate::entities::{NewParticipant, NewTeam, ParticipantRegistry, TeamRegistry};
use crate::error::Result;
use crate::parser::{ParsedDocument, ParticipantFragment};
use crate::regions::RegionDirectory;

/// What resolving one document did to the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolveStats {
    pub teams_seen: usize,
    pub teams_inserted: usize,
    pub participants_seen: usize,
    pub participants_inserted: usize,
    pub participants_reused: usize,
    pub links_written: usize,
}

#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub stats: ResolveStats,
    pub warnings: Vec<AuditEntry>,
}

pub struct EntityResolver<'a> {
    conn: &'a Connection,
    regions: &'a RegionDirectory,
}

impl<'a> EntityResolver<'a> {
    pub fn new(conn: &'a Connection, regions: &'a RegionDirectory) -> Self {
        EntityResolver { conn, regions }
    }

    /// Resolve every team and participant of `doc` against the registry and
    /// link them to `meet_id`.
    pub fn resolve(&self, meet_id: i64, doc: &ParsedDocument) -> Result<ResolveOutcome> {
        let mut outcome = ResolveOutcome::default();
        let teams = TeamRegistry::new(self.conn);

        // Fragment index → team id
        let mut team_ids = Vec::with_capacity(doc.teams.len());
        for fragment in &doc.teams {
            let region = self.regions.resolve(&fragment.region_code);
            if region.is_empty() && !fragment.region_code.is_empty() {
                outcome.warnings.push(
                    AuditEntry::new(
                        AuditKind::DataQualityWarning,
                        format!(
                            "unknown region code '{}' for team {}",
                            fragment.region_code, fragment.code
                        ),
                    )
                    .with_context(serde_json::json!({
                        "team_code": fragment.code,
                        "team_name": fragment.name,
                        "region_code": fragment.region_code,
                    }))
                    .for_meet(meet_id),
                );
            }

            let existed = teams.find(&fragment.code, &fragment.name)?.is_some();
            let team_id = teams.upsert(&NewTeam {
                code: &fragment.code,
                name: &fragment.name,
                team_type: fragment.team_type.as_str(),
                region_code: &fragment.region_code,
                region,
            })?;
            if !existed {
                outcome.stats.teams_inserted += 1;
            }
            outcome.stats.teams_seen += 1;

            if link_meet_team(self.conn, meet_id, team_id)? {
                outcome.stats.links_written += 1;
            }
            team_ids.push(team_id);
        }

        for fragment in &doc.participants {
            let team_id = team_ids[fragment.team];
            let (participant_id, inserted) = self.resolve_participant(fragment, team_id)?;
            outcome.stats.participants_seen += 1;
            if inserted {
                outcome.stats.participants_inserted += 1;
            } else {
                outcome.stats.participants_reused += 1;
            }

            if link_meet_participant(self.conn, meet_id, participant_id)? {
                outcome.stats.links_written += 1;
            }
            if link_meet_team_participant(self.conn, meet_id, team_id, participant_id)? {
                outcome.stats.links_written += 1;
            }
        }

        tracing::debug!(
            meet_id,
            teams = outcome.stats.teams_seen,
            participants = outcome.stats.participants_seen,
            inserted = outcome.stats.participants_inserted,
            "Resolved entities"
        );

        Ok(outcome)
    }

    /// Returns (participant id, whether it was newly inserted).
    fn resolve_participant(&self, fragment: &ParticipantFragment, team_id: i64) -> Result<(i64, bool)> {
        let registry = ParticipantRegistry::new(self.conn);

        let existing = match fragment.registry_number.as_deref() {
            Some(number) if !number.is_empty() => registry.find_by_registry_number(number)?,
            _ => registry.find_by_details(
                &fragment.first_name,
                &fragment.last_name,
                &fragment.gender,
                fragment.birth_date,
            )?,
        };

        if let Some(participant) = existing {
            if participant.team_id != Some(team_id) {
                registry.set_team(participant.id, team_id)?;
            }
            return Ok((participant.id, false));
        }

        let id = registry.insert(&NewParticipant {
            first_name: &fragment.first_name,
            last_name: &fragment.last_name,
            gender: &fragment.gender,
            birth_date: fragment.birth_date,
            registry_number: fragment.registry_number.as_deref().filter(|n| !n.is_empty()),
            team_id,
        })?;
        Ok((id, true))
    }
}
