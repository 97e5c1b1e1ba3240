// 🏊 Team Entity - global registry keyed by (code, display name)
//
// Identity is immutable once created. Later sightings may refresh the display
// fields (type, region code, region name) but never create a second row.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub team_type: String,
    pub region_code: String,
    /// Resolved through the region directory; "" when the code is unknown
    pub region: String,
}

/// Team as sighted in a result document, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTeam<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub team_type: &'a str,
    pub region_code: &'a str,
    pub region: &'a str,
}

pub struct TeamRegistry<'c> {
    conn: &'c Connection,
}

impl<'c> TeamRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        TeamRegistry { conn }
    }

    pub fn find(&self, code: &str, name: &str) -> Result<Option<Team>> {
        let team = self
            .conn
            .query_row(
                "SELECT id, team_code, team_name, team_type, region_code, region
                 FROM teams WHERE team_code = ?1 AND team_name = ?2",
                params![code, name],
                row_to_team,
            )
            .optional()?;
        Ok(team)
    }

    pub fn get(&self, id: i64) -> Result<Option<Team>> {
        let team = self
            .conn
            .query_row(
                "SELECT id, team_code, team_name, team_type, region_code, region
                 FROM teams WHERE id = ?1",
                [id],
                row_to_team,
            )
            .optional()?;
        Ok(team)
    }

    /// Insert on first sighting, refresh display fields otherwise. Returns the id.
    pub fn upsert(&self, team: &NewTeam) -> Result<i64> {
        if let Some(existing) = self.find(team.code, team.name)? {
            self.conn.execute(
                "UPDATE teams SET team_type = ?1, region_code = ?2, region = ?3 WHERE id = ?4",
                params![team.team_type, team.region_code, team.region, existing.id],
            )?;
            return Ok(existing.id);
        }

        self.conn.execute(
            "INSERT INTO teams (team_code, team_name, team_type, region_code, region)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                team.code,
                team.name,
                team.team_type,
                team.region_code,
                team.region
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn all(&self) -> Result<Vec<Team>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, team_code, team_name, team_type, region_code, region
             FROM teams ORDER BY team_code, team_name",
        )?;
        let teams = stmt
            .query_map([], row_to_team)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(teams)
    }
}

fn row_to_team(row: &rusqlite::Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        team_type: row.get(3)?,
        region_code: row.get(4)?,
        region: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, setup_database};

    fn hamilton<'a>(region: &'a str) -> NewTeam<'a> {
        NewTeam {
            code: "HAMW",
            name: "Hamilton West",
            team_type: "Club",
            region_code: "WK",
            region,
        }
    }

    #[test]
    fn test_upsert_reuses_identity() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let registry = TeamRegistry::new(&conn);

        let first = registry.upsert(&hamilton("")).unwrap();
        let second = registry.upsert(&hamilton("Waikato")).unwrap();

        assert_eq!(first, second);
        assert_eq!(count_rows(&conn, "teams").unwrap(), 1);
        // display field refreshed by the later sighting
        assert_eq!(registry.get(first).unwrap().unwrap().region, "Waikato");
    }

    #[test]
    fn test_same_code_different_name_is_distinct() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let registry = TeamRegistry::new(&conn);

        let a = registry.upsert(&hamilton("")).unwrap();
        let b = registry
            .upsert(&NewTeam {
                name: "Hamilton West Masters",
                ..hamilton("")
            })
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(registry.all().unwrap().len(), 2);
    }
}
