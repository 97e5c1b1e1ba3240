// 🏗️ Record Parser - line-tagged result documents
//
// Every line starts with a two-character record tag followed by fixed-position
// fields. Decoding is a closed dispatch: each line becomes one `Record`
// variant, then `parse_lines` folds the records into a `ParsedDocument`,
// carrying the current team forward onto participant records.
//
// Bad lines never abort a document: unknown tags are skipped silently,
// malformed lines become FormatWarnings and are skipped, gaps in otherwise
// valid records become DataQualityWarnings and are kept as-is.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntry, AuditKind};
use crate::dates::parse_ddmmyyyy;

// ============================================================================
// LAYOUT (1-based columns)
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub start: usize,
    pub len: usize,
}

impl Field {
    const fn new(start: usize, len: usize) -> Self {
        Field { start, len }
    }

    /// Last column covered by this field.
    pub const fn end(&self) -> usize {
        self.start + self.len - 1
    }

    /// Right-trimmed slice of `line`; columns past the end read as blank.
    pub fn slice(&self, line: &str) -> String {
        let raw: String = line.chars().skip(self.start - 1).take(self.len).collect();
        raw.trim().to_string()
    }
}

pub mod layout {
    use super::Field;

    pub const TAG: Field = Field::new(1, 2);

    pub const MEET_NAME: Field = Field::new(3, 45);
    pub const MEET_LOCATION: Field = Field::new(48, 45);
    pub const MEET_START: Field = Field::new(93, 8);
    pub const MEET_END: Field = Field::new(101, 8);

    pub const MEET_TYPE_CODE: Field = Field::new(97, 2);
    pub const COURSE_CODE: Field = Field::new(99, 1);

    pub const TEAM_CODE: Field = Field::new(3, 5);
    pub const TEAM_NAME: Field = Field::new(8, 30);
    pub const TEAM_REGION_CODE: Field = Field::new(54, 2);

    pub const GENDER: Field = Field::new(3, 1);
    pub const LAST_NAME: Field = Field::new(9, 20);
    pub const FIRST_NAME: Field = Field::new(29, 20);
    pub const REGISTRY_NUMBER: Field = Field::new(70, 14);
    pub const BIRTH_DATE: Field = Field::new(89, 8);

    /// Minimum line length (last required column) per tag.
    pub const MEET_HEADER_MIN: usize = MEET_START.end();
    pub const MEET_DETAILS_MIN: usize = COURSE_CODE.end();
    pub const TEAM_MIN: usize = TEAM_CODE.end();
    pub const PARTICIPANT_MIN: usize = FIRST_NAME.end();
}

/// Meet type codes of school competitions; teams at these meets carry no region.
pub const SCHOOL_MEET_TYPE_CODES: [&str; 2] = ["03", "04"];

// ============================================================================
// RECORD TAGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    MeetHeader,
    MeetDetails,
    Team,
    Participant,
    Other,
}

impl RecordTag {
    pub fn from_line(line: &str) -> RecordTag {
        match layout::TAG.slice(line).as_str() {
            "B1" => RecordTag::MeetHeader,
            "B2" => RecordTag::MeetDetails,
            "C1" => RecordTag::Team,
            "D1" => RecordTag::Participant,
            _ => RecordTag::Other,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RecordTag::MeetHeader => "B1",
            RecordTag::MeetDetails => "B2",
            RecordTag::Team => "C1",
            RecordTag::Participant => "D1",
            RecordTag::Other => "",
        }
    }

    fn min_len(&self) -> usize {
        match self {
            RecordTag::MeetHeader => layout::MEET_HEADER_MIN,
            RecordTag::MeetDetails => layout::MEET_DETAILS_MIN,
            RecordTag::Team => layout::TEAM_MIN,
            RecordTag::Participant => layout::PARTICIPANT_MIN,
            RecordTag::Other => 0,
        }
    }
}

// ============================================================================
// FRAGMENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamType {
    Club,
    HighSchool,
    College,
}

impl TeamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamType::Club => "Club",
            TeamType::HighSchool => "High School",
            TeamType::College => "College",
        }
    }

    /// Infer the type from the team's display name.
    pub fn detect(name: &str) -> TeamType {
        let lower = name.to_lowercase();
        if lower.contains("college") || lower.contains("university") {
            TeamType::College
        } else if lower.contains("school") || lower.contains("high") || lower.contains("grammar") {
            TeamType::HighSchool
        } else {
            TeamType::Club
        }
    }

    pub fn is_school(&self) -> bool {
        !matches!(self, TeamType::Club)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetHeader {
    pub name: String,
    pub location: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub meet_type_code: String,
    pub course_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamFragment {
    pub code: String,
    pub name: String,
    pub team_type: TeamType,
    pub region_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantFragment {
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub birth_date: Option<NaiveDate>,
    pub registry_number: Option<String>,
    /// Index into `ParsedDocument::teams` of the team this sighting belongs to
    pub team: usize,
}

/// One decoded line.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    MeetHeader {
        name: String,
        location: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    MeetDetails {
        meet_type_code: String,
        course_code: String,
    },
    Team {
        code: String,
        name: String,
        region_code: String,
    },
    Participant {
        first_name: String,
        last_name: String,
        gender: String,
        birth_date: Option<NaiveDate>,
        registry_number: Option<String>,
    },
    Unrecognized,
}

// ============================================================================
// WARNINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub kind: AuditKind,
    pub line_number: usize,
    pub message: String,
    pub excerpt: String,
}

impl ParseWarning {
    fn new(kind: AuditKind, line_number: usize, message: impl Into<String>, line: &str) -> Self {
        ParseWarning {
            kind,
            line_number,
            message: message.into(),
            excerpt: line.chars().take(50).collect(),
        }
    }

    pub fn to_audit_entry(&self) -> AuditEntry {
        AuditEntry::new(
            self.kind,
            format!("line {}: {}", self.line_number, self.message),
        )
        .with_context(serde_json::json!({
            "line": self.line_number,
            "excerpt": self.excerpt,
        }))
    }
}

// ============================================================================
// DECODING
// ============================================================================

fn parse_required_date(field: Field, line: &str, what: &str) -> Result<NaiveDate, String> {
    let token = field.slice(line);
    parse_ddmmyyyy(&token).ok_or_else(|| format!("invalid {} token '{}'", what, token))
}

fn parse_optional_date(field: Field, line: &str, what: &str) -> Result<Option<NaiveDate>, String> {
    let token = field.slice(line);
    if token.is_empty() {
        return Ok(None);
    }
    parse_ddmmyyyy(&token)
        .map(Some)
        .ok_or_else(|| format!("invalid {} token '{}'", what, token))
}

/// Decode a single line. `Err` carries the reason the line is malformed.
pub fn decode_line(line: &str) -> Result<Record, String> {
    let tag = RecordTag::from_line(line);
    if tag == RecordTag::Other {
        return Ok(Record::Unrecognized);
    }

    let len = line.chars().count();
    if len < tag.min_len() {
        return Err(format!(
            "{} record too short ({} of {} columns)",
            tag.code(),
            len,
            tag.min_len()
        ));
    }

    match tag {
        RecordTag::MeetHeader => {
            let name = layout::MEET_NAME.slice(line);
            if name.is_empty() {
                return Err("meet header without a name".to_string());
            }
            let start = parse_required_date(layout::MEET_START, line, "meet start date")?;
            let end = parse_optional_date(layout::MEET_END, line, "meet end date")?.unwrap_or(start);

            Ok(Record::MeetHeader {
                name,
                location: layout::MEET_LOCATION.slice(line),
                start,
                end,
            })
        }
        RecordTag::MeetDetails => Ok(Record::MeetDetails {
            meet_type_code: layout::MEET_TYPE_CODE.slice(line),
            course_code: layout::COURSE_CODE.slice(line),
        }),
        RecordTag::Team => {
            let code = layout::TEAM_CODE.slice(line);
            if code.is_empty() {
                return Err("team record without a team code".to_string());
            }
            Ok(Record::Team {
                code,
                name: layout::TEAM_NAME.slice(line),
                region_code: layout::TEAM_REGION_CODE.slice(line).to_uppercase(),
            })
        }
        RecordTag::Participant => {
            let registry_number = layout::REGISTRY_NUMBER.slice(line);
            Ok(Record::Participant {
                first_name: layout::FIRST_NAME.slice(line),
                last_name: layout::LAST_NAME.slice(line),
                gender: layout::GENDER.slice(line),
                birth_date: parse_optional_date(layout::BIRTH_DATE, line, "birth date")?,
                registry_number: if registry_number.is_empty() {
                    None
                } else {
                    Some(registry_number)
                },
            })
        }
        RecordTag::Other => Ok(Record::Unrecognized),
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub meet: Option<MeetHeader>,
    pub teams: Vec<TeamFragment>,
    pub participants: Vec<ParticipantFragment>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedDocument {
    pub fn team_of(&self, participant: &ParticipantFragment) -> &TeamFragment {
        &self.teams[participant.team]
    }

    pub fn format_warnings(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| w.kind == AuditKind::FormatWarning)
            .count()
    }
}

/// Fold a document's lines into meet/team/participant fragments.
pub fn parse_lines<I, S>(lines: I) -> ParsedDocument
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut doc = ParsedDocument::default();
    let mut meet_type_code = String::new();
    let mut course_code = String::new();
    let mut current_team: Option<usize> = None;

    for (index, raw) in lines.into_iter().enumerate() {
        let line_number = index + 1;
        let line = raw.as_ref().trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        let record = match decode_line(line) {
            Ok(record) => record,
            Err(reason) => {
                tracing::debug!(line_number, reason = %reason, "Skipping malformed record");
                doc.warnings.push(ParseWarning::new(
                    AuditKind::FormatWarning,
                    line_number,
                    reason,
                    line,
                ));
                continue;
            }
        };

        match record {
            Record::MeetHeader {
                name,
                location,
                start,
                end,
            } => {
                if doc.meet.is_some() {
                    doc.warnings.push(ParseWarning::new(
                        AuditKind::FormatWarning,
                        line_number,
                        "additional meet header ignored",
                        line,
                    ));
                    continue;
                }
                doc.meet = Some(MeetHeader {
                    name,
                    location,
                    start,
                    end,
                    meet_type_code: String::new(),
                    course_code: String::new(),
                });
            }
            Record::MeetDetails {
                meet_type_code: mt,
                course_code: cc,
            } => {
                meet_type_code = mt;
                course_code = cc;
            }
            Record::Team {
                code,
                name,
                region_code,
            } => {
                let team_type = TeamType::detect(&name);
                let school_meet = SCHOOL_MEET_TYPE_CODES.contains(&meet_type_code.as_str());
                let region_code = if school_meet || team_type.is_school() {
                    String::new()
                } else {
                    region_code
                };

                doc.teams.push(TeamFragment {
                    code,
                    name,
                    team_type,
                    region_code,
                });
                current_team = Some(doc.teams.len() - 1);
            }
            Record::Participant {
                first_name,
                last_name,
                gender,
                birth_date,
                registry_number,
            } => {
                let Some(team) = current_team else {
                    doc.warnings.push(ParseWarning::new(
                        AuditKind::FormatWarning,
                        line_number,
                        "participant record before any team record",
                        line,
                    ));
                    continue;
                };

                let mut gaps = Vec::new();
                if gender.is_empty() {
                    gaps.push("gender");
                }
                if first_name.is_empty() {
                    gaps.push("first name");
                }
                if last_name.is_empty() {
                    gaps.push("last name");
                }
                if !gaps.is_empty() {
                    doc.warnings.push(ParseWarning::new(
                        AuditKind::DataQualityWarning,
                        line_number,
                        format!("participant missing {}", gaps.join(", ")),
                        line,
                    ));
                }

                doc.participants.push(ParticipantFragment {
                    first_name,
                    last_name,
                    gender,
                    birth_date,
                    registry_number,
                    team,
                });
            }
            Record::Unrecognized => {}
        }
    }

    if let Some(meet) = doc.meet.as_mut() {
        meet.meet_type_code = meet_type_code;
        meet.course_code = course_code;
    }

    doc
}

// ============================================================================
// LINE BUILDERS (fixtures for tests of this crate)
// ============================================================================
