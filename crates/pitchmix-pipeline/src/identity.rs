// Player identity and team resolution.
//
// Names come from an identity source keyed by MLBAM id. Teams come from the
// events themselves: a player belongs to the team they appeared for most
// often in the window, so a mid-window trade collapses to one team.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::IdentityConfig;
use crate::statcast::PitchEvent;

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerName {
    pub first: Option<String>,
    pub last: Option<String>,
}

impl PlayerName {
    /// "First Last", or `None` if either half is unknown.
    pub fn full_name(&self) -> Option<String> {
        match (&self.first, &self.last) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity request returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed identity response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resolves numeric player ids to names. Ids the source does not know are
/// simply absent from the result.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn lookup(&self, ids: &[u32]) -> Result<HashMap<u32, PlayerName>, IdentityError>;
}

/// Build the configured identity source.
pub fn identity_from_config(config: &IdentityConfig) -> Result<Box<dyn IdentitySource>, reqwest::Error> {
    Ok(match config {
        IdentityConfig::StatsApi {
            base_url,
            batch_size,
            request_timeout_secs,
        } => Box::new(StatsApiClient::new(
            base_url.clone(),
            *batch_size,
            Duration::from_secs(*request_timeout_secs),
        )?),
        IdentityConfig::Offline => Box::new(OfflineIdentity),
    })
}

/// Leaves every name unresolved.
pub struct OfflineIdentity;

#[async_trait]
impl IdentitySource for OfflineIdentity {
    async fn lookup(&self, _ids: &[u32]) -> Result<HashMap<u32, PlayerName>, IdentityError> {
        Ok(HashMap::new())
    }
}

/// MLB Stats API `people` endpoint client.
pub struct StatsApiClient {
    http: reqwest::Client,
    base_url: String,
    batch_size: usize,
}

#[derive(Debug, Deserialize)]
struct PeopleResponse {
    #[serde(default)]
    people: Vec<Person>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    id: u32,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

/// Extract the `people` array from a Stats API response body.
fn parse_people(body: &str) -> Result<Vec<Person>, serde_json::Error> {
    serde_json::from_str::<PeopleResponse>(body).map(|r| r.people)
}

impl StatsApiClient {
    pub fn new(base_url: String, batch_size: usize, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            batch_size: batch_size.max(1),
        })
    }
}

#[async_trait]
impl IdentitySource for StatsApiClient {
    async fn lookup(&self, ids: &[u32]) -> Result<HashMap<u32, PlayerName>, IdentityError> {
        let mut names = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(self.batch_size) {
            let joined = chunk
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let response = self
                .http
                .get(&self.base_url)
                .query(&[("personIds", joined.as_str())])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(IdentityError::Status(response.status()));
            }
            let people = parse_people(&response.text().await?)?;
            debug!(requested = chunk.len(), resolved = people.len(), "identity batch");
            for person in people {
                names.insert(
                    person.id,
                    PlayerName {
                        first: person.first_name,
                        last: person.last_name,
                    },
                );
            }
        }
        Ok(names)
    }
}

/// Look up full names for `ids`. Unknown ids map to `None`.
pub async fn resolve_names(
    source: &dyn IdentitySource,
    ids: &BTreeSet<u32>,
) -> Result<BTreeMap<u32, Option<String>>, IdentityError> {
    let ids: Vec<u32> = ids.iter().copied().collect();
    let found = source.lookup(&ids).await?;
    let resolved: BTreeMap<u32, Option<String>> = ids
        .iter()
        .map(|id| (*id, found.get(id).and_then(PlayerName::full_name)))
        .collect();
    let named = resolved.values().filter(|n| n.is_some()).count();
    info!("Resolved names for {named} of {} players", resolved.len());
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

fn is_top_half(event: &PitchEvent) -> Option<bool> {
    match event.inning_topbot.as_deref() {
        Some("Top") => Some(true),
        Some("Bot") => Some(false),
        _ => None,
    }
}

/// The batting side: visitors bat in the top half.
pub fn batter_team(event: &PitchEvent) -> Option<&str> {
    match is_top_half(event)? {
        true => event.away_team.as_deref(),
        false => event.home_team.as_deref(),
    }
}

/// The fielding side.
pub fn pitcher_team(event: &PitchEvent) -> Option<&str> {
    match is_top_half(event)? {
        true => event.home_team.as_deref(),
        false => event.away_team.as_deref(),
    }
}

/// Each player's most frequent team over their events. Ties go to the
/// alphabetically first abbreviation.
pub fn majority_teams<K, T>(events: &[PitchEvent], player: K, team: T) -> HashMap<u32, String>
where
    K: Fn(&PitchEvent) -> u32,
    T: for<'e> Fn(&'e PitchEvent) -> Option<&'e str>,
{
    let mut counts: HashMap<u32, BTreeMap<&str, u32>> = HashMap::new();
    for event in events {
        if let Some(abbr) = team(event) {
            *counts.entry(player(event)).or_default().entry(abbr).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .filter_map(|(id, teams)| {
            // Iteration is alphabetical, and max_by keeps the last maximum,
            // so compare in reverse to keep the first.
            teams
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
                .map(|(abbr, _)| (id, abbr.to_string()))
        })
        .collect()
}

/// One row of the normalized team table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRecord {
    pub team_id: u32,
    pub team: String,
}

/// Team abbreviations numbered 1..n in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamTable {
    records: Vec<TeamRecord>,
}

impl TeamTable {
    /// Build from any collection of abbreviations; order and duplicates in
    /// the input do not matter.
    pub fn build<I, S>(teams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = teams.into_iter().map(Into::into).collect();
        let records = sorted
            .into_iter()
            .zip(1u32..)
            .map(|(team, team_id)| TeamRecord { team_id, team })
            .collect();
        Self { records }
    }

    pub fn id_of(&self, team: &str) -> Option<u32> {
        self.records
            .binary_search_by(|r| r.team.as_str().cmp(team))
            .ok()
            .map(|idx| self.records[idx].team_id)
    }

    pub fn records(&self) -> &[TeamRecord] {
        &self.records
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    /// Local HTTP endpoint that answers every request with `status_line`.
    fn serve_status(status_line: &'static str) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}/endpoint")
    }

    /// Address nothing is listening on.
    fn closed_port() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/endpoint")
    }

    struct FixedNames(HashMap<u32, PlayerName>);

    #[async_trait]
    impl IdentitySource for FixedNames {
        async fn lookup(&self, ids: &[u32]) -> Result<HashMap<u32, PlayerName>, IdentityError> {
            Ok(ids
                .iter()
                .filter_map(|id| self.0.get(id).map(|n| (*id, n.clone())))
                .collect())
        }
    }

    fn name(first: Option<&str>, last: Option<&str>) -> PlayerName {
        PlayerName {
            first: first.map(String::from),
            last: last.map(String::from),
        }
    }

    fn game(pitcher: u32, batter: u32, half: &str, home: &str, away: &str) -> PitchEvent {
        PitchEvent {
            pitcher,
            batter,
            inning_topbot: Some(half.into()),
            home_team: Some(home.into()),
            away_team: Some(away.into()),
            ..Default::default()
        }
    }

    #[test]
    fn full_name_requires_both_parts() {
        assert_eq!(name(Some("Gerrit"), Some("Cole")).full_name().as_deref(), Some("Gerrit Cole"));
        assert_eq!(name(None, Some("Cole")).full_name(), None);
        assert_eq!(name(Some("Gerrit"), None).full_name(), None);
    }

    #[test]
    fn parses_people_payload() {
        let body = r#"{
            "copyright": "MLB",
            "people": [
                {"id": 543037, "fullName": "Gerrit Cole", "firstName": "Gerrit", "lastName": "Cole"},
                {"id": 1, "lastName": "Mystery"}
            ]
        }"#;
        let people = parse_people(body).unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].id, 543037);
        assert_eq!(people[0].first_name.as_deref(), Some("Gerrit"));
        assert_eq!(people[1].first_name, None);

        assert!(parse_people(r#"{"copyright": "MLB"}"#).unwrap().is_empty());
        assert!(parse_people("<html>").is_err());
    }

    #[tokio::test]
    async fn unknown_ids_resolve_to_none() {
        let source = FixedNames(HashMap::from([(1, name(Some("Aaron"), Some("Judge")))]));
        let ids = BTreeSet::from([1, 2]);
        let names = resolve_names(&source, &ids).await.unwrap();
        assert_eq!(names[&1].as_deref(), Some("Aaron Judge"));
        assert_eq!(names[&2], None);
    }

    #[tokio::test]
    async fn offline_identity_resolves_nothing() {
        let names = resolve_names(&OfflineIdentity, &BTreeSet::from([7])).await.unwrap();
        assert_eq!(names[&7], None);
    }

    #[test]
    fn sides_follow_inning_half() {
        let top = game(1, 2, "Top", "NYY", "BOS");
        assert_eq!(batter_team(&top), Some("BOS"));
        assert_eq!(pitcher_team(&top), Some("NYY"));

        let bottom = game(1, 2, "Bot", "NYY", "BOS");
        assert_eq!(batter_team(&bottom), Some("NYY"));
        assert_eq!(pitcher_team(&bottom), Some("BOS"));

        let unknown = PitchEvent::default();
        assert_eq!(batter_team(&unknown), None);
    }

    #[test]
    fn traded_player_gets_majority_team() {
        let events = vec![
            game(10, 1, "Top", "NYY", "BOS"),
            game(10, 1, "Top", "NYY", "BOS"),
            game(10, 1, "Bot", "TOR", "NYY"),
        ];
        let pitchers = majority_teams(&events, |e| e.pitcher, pitcher_team);
        // Two pitches for NYY at home, one for NYY away: NYY both times.
        assert_eq!(pitchers[&10], "NYY");

        let events = vec![
            game(10, 1, "Top", "NYY", "BOS"),
            game(10, 1, "Top", "LAD", "SD"),
            game(10, 1, "Top", "LAD", "SD"),
        ];
        let pitchers = majority_teams(&events, |e| e.pitcher, pitcher_team);
        assert_eq!(pitchers[&10], "LAD");
        assert_eq!(pitchers.len(), 1);
    }

    #[test]
    fn majority_tie_goes_to_alphabetical_first() {
        let events = vec![game(10, 1, "Top", "SEA", "BOS"), game(10, 1, "Top", "ATL", "BOS")];
        let pitchers = majority_teams(&events, |e| e.pitcher, pitcher_team);
        assert_eq!(pitchers[&10], "ATL");
    }

    #[test]
    fn team_ids_are_sorted_and_one_based() {
        let table = TeamTable::build(["NYY", "BOS", "ATL", "BOS"]);
        let rows: Vec<(u32, &str)> = table
            .records()
            .iter()
            .map(|r| (r.team_id, r.team.as_str()))
            .collect();
        assert_eq!(rows, vec![(1, "ATL"), (2, "BOS"), (3, "NYY")]);
        assert_eq!(table.id_of("BOS"), Some(2));
        assert_eq!(table.id_of("SEA"), None);
    }

    #[test]
    fn team_ids_do_not_depend_on_input_order() {
        let a = TeamTable::build(["SEA", "ATL", "NYY", "LAD"]);
        let b = TeamTable::build(["LAD", "NYY", "SEA", "ATL"]);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn server_error_is_an_identity_failure() {
        let client = StatsApiClient::new(
            serve_status("500 Internal Server Error"),
            100,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.lookup(&[543037, 592450]).await.unwrap_err();
        assert!(matches!(
            err,
            IdentityError::Status(status) if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn unreachable_identity_host_is_an_http_error() {
        let client = StatsApiClient::new(closed_port(), 100, Duration::from_secs(5)).unwrap();
        let err = client.lookup(&[543037]).await.unwrap_err();
        assert!(matches!(err, IdentityError::Http(_)));
    }
}
