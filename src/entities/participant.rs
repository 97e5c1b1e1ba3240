// 🧑 Participant Entity - global registry
//
// Two identity keys:
// - registry number, when the sighting carries one
// - (first name, last name, gender, birth date) otherwise, matched across
//   numbered and unnumbered rows
// Partial unique indexes keep numbers unique and unnumbered details unique.
// A participant row also remembers the team of its latest sighting.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::dates::{from_iso, to_iso};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub birth_date: Option<NaiveDate>,
    pub registry_number: Option<String>,
    pub team_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewParticipant<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub gender: &'a str,
    pub birth_date: Option<NaiveDate>,
    pub registry_number: Option<&'a str>,
    pub team_id: i64,
}

const SELECT_COLUMNS: &str =
    "SELECT id, first_name, last_name, gender, birth_date, registry_number, team_id FROM participants";

pub struct ParticipantRegistry<'c> {
    conn: &'c Connection,
}

impl<'c> ParticipantRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        ParticipantRegistry { conn }
    }

    pub fn find_by_registry_number(&self, registry_number: &str) -> Result<Option<Participant>> {
        let sql = format!("{} WHERE registry_number = ?1", SELECT_COLUMNS);
        let participant = self
            .conn
            .query_row(&sql, [registry_number], row_to_participant)
            .optional()?;
        Ok(participant)
    }

    /// Match on personal details, numbered or not. A row without a registry
    /// number wins over a numbered one, then the oldest row.
    pub fn find_by_details(
        &self,
        first_name: &str,
        last_name: &str,
        gender: &str,
        birth_date: Option<NaiveDate>,
    ) -> Result<Option<Participant>> {
        let sql = format!(
            "{} WHERE first_name = ?1 AND last_name = ?2 AND gender = ?3 AND birth_date IS ?4
             ORDER BY registry_number IS NOT NULL, id
             LIMIT 1",
            SELECT_COLUMNS
        );
        let participant = self
            .conn
            .query_row(
                &sql,
                params![first_name, last_name, gender, birth_date.map(to_iso)],
                row_to_participant,
            )
            .optional()?;
        Ok(participant)
    }

    pub fn get(&self, id: i64) -> Result<Option<Participant>> {
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let participant = self
            .conn
            .query_row(&sql, [id], row_to_participant)
            .optional()?;
        Ok(participant)
    }

    pub fn insert(&self, participant: &NewParticipant) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO participants
                (first_name, last_name, gender, birth_date, registry_number, team_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                participant.first_name,
                participant.last_name,
                participant.gender,
                participant.birth_date.map(to_iso),
                participant.registry_number,
                participant.team_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Point an existing participant at the team of its latest sighting.
    pub fn set_team(&self, id: i64, team_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE participants SET team_id = ?1 WHERE id = ?2",
            params![team_id, id],
        )?;
        Ok(())
    }
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    let birth_date: Option<String> = row.get(4)?;
    Ok(Participant {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        gender: row.get(3)?,
        birth_date: birth_date.as_deref().and_then(from_iso),
        registry_number: row.get(5)?,
        team_id: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::entities::team::{NewTeam, TeamRegistry};

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let team_id = TeamRegistry::new(&conn)
            .upsert(&NewTeam {
                code: "HAMW",
                name: "Hamilton West",
                team_type: "Club",
                region_code: "WK",
                region: "Waikato",
            })
            .unwrap();
        (conn, team_id)
    }

    #[test]
    fn test_find_by_details_handles_missing_birth_date() {
        let (conn, team_id) = setup();
        let registry = ParticipantRegistry::new(&conn);

        let id = registry
            .insert(&NewParticipant {
                first_name: "Jane",
                last_name: "Doe",
                gender: "F",
                birth_date: None,
                registry_number: None,
                team_id,
            })
            .unwrap();

        let found = registry.find_by_details("Jane", "Doe", "F", None).unwrap();
        assert_eq!(found.map(|p| p.id), Some(id));

        let born = NaiveDate::from_ymd_opt(1998, 3, 5);
        assert!(registry.find_by_details("Jane", "Doe", "F", born).unwrap().is_none());
    }

    #[test]
    fn test_find_by_details_prefers_unnumbered_row() {
        let (conn, team_id) = setup();
        let registry = ParticipantRegistry::new(&conn);
        let born = NaiveDate::from_ymd_opt(1998, 3, 5);
        let numbered = registry
            .insert(&NewParticipant {
                first_name: "Jane",
                last_name: "Doe",
                gender: "F",
                birth_date: born,
                registry_number: Some("NZ123"),
                team_id,
            })
            .unwrap();

        let found = registry.find_by_details("Jane", "Doe", "F", born).unwrap();
        assert_eq!(found.map(|p| p.id), Some(numbered));

        let unnumbered = registry
            .insert(&NewParticipant {
                first_name: "Jane",
                last_name: "Doe",
                gender: "F",
                birth_date: born,
                registry_number: None,
                team_id,
            })
            .unwrap();
        let found = registry.find_by_details("Jane", "Doe", "F", born).unwrap();
        assert_eq!(found.map(|p| p.id), Some(unnumbered));
    }

    #[test]
    fn test_registry_number_is_unique_in_storage() {
        let (conn, team_id) = setup();
        let registry = ParticipantRegistry::new(&conn);
        let jane = NewParticipant {
            first_name: "Jane",
            last_name: "Doe",
            gender: "F",
            birth_date: NaiveDate::from_ymd_opt(1998, 3, 5),
            registry_number: Some("111"),
            team_id,
        };

        registry.insert(&jane).unwrap();
        assert!(registry.insert(&jane).is_err());

        let found = registry.find_by_registry_number("111").unwrap().unwrap();
        assert_eq!(found.birth_date, NaiveDate::from_ymd_opt(1998, 3, 5));
    }
}
