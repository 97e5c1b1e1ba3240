// Entity Models - registry rows and their repository operations
//
// Each entity owns its identity rules:
// - Meet: URL, then file path, then (advisory) canonical name + start date
// - Team: (code, display name)
// - Participant: registry number, else personal details
// Links are pure key tuples between meets and the other two.

pub mod links;
pub mod meet;
pub mod participant;
pub mod team;

pub use meet::{DiscoveredMeet, Meet, MeetLedger, ParsedMeetFacts};
pub use participant::{NewParticipant, Participant, ParticipantRegistry};
pub use team::{NewTeam, Team, TeamRegistry};
