// Pitcher-and-team matchup query over the loaded tables.

use tracing::debug;

/// One row of the pitcher sheet, reduced to what the query needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PitcherEntry {
    pub full_name: Option<String>,
    /// Statcast's "Last, First" spelling.
    pub player_name: Option<String>,
    pub cluster: usize,
}

impl PitcherEntry {
    fn answers_to(&self, name: &str) -> bool {
        [&self.full_name, &self.player_name]
            .into_iter()
            .flatten()
            .any(|candidate| candidate.trim().to_lowercase() == name)
    }
}

/// One row of the batter-vs-cluster sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchupEntry {
    pub cluster: usize,
    pub team: Option<String>,
    pub batter_full_name: Option<String>,
    pub batting_average: f64,
    pub slugging: f64,
    pub proxy_war: f64,
    pub plate_appearances: u32,
    pub hits: u32,
}

/// The projection returned to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchupView {
    pub batter_full_name: Option<String>,
    pub batting_average: f64,
    pub slugging: f64,
    pub proxy_war: f64,
    pub plate_appearances: u32,
    pub hits: u32,
}

impl From<&MatchupEntry> for MatchupView {
    fn from(entry: &MatchupEntry) -> Self {
        Self {
            batter_full_name: entry.batter_full_name.clone(),
            batting_average: entry.batting_average,
            slugging: entry.slugging,
            proxy_war: entry.proxy_war,
            plate_appearances: entry.plate_appearances,
            hits: entry.hits,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    /// No pitcher by that name in the published tables.
    NoMatch,
    /// The pitcher exists but nobody on the team qualifies against their
    /// cluster.
    EmptyTeam { cluster: usize },
    Matchups { cluster: usize, rows: Vec<MatchupView> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupTables {
    pub pitchers: Vec<PitcherEntry>,
    pub matchups: Vec<MatchupEntry>,
}

impl LookupTables {
    /// Cluster of the first pitcher whose full name (or Statcast name)
    /// matches, ignoring case and surrounding whitespace.
    pub fn pitcher_cluster(&self, pitcher: &str) -> Option<usize> {
        let wanted = pitcher.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.pitchers
            .iter()
            .find(|p| p.answers_to(&wanted))
            .map(|p| p.cluster)
    }

    /// Batters from `team` against the named pitcher's cluster, best proxy
    /// WAR first. The team abbreviation is uppercased and then compared
    /// exactly.
    pub fn query(&self, pitcher: &str, team: &str) -> LookupResult {
        let Some(cluster) = self.pitcher_cluster(pitcher) else {
            debug!(pitcher, "no pitcher match");
            return LookupResult::NoMatch;
        };
        let team = team.trim().to_uppercase();

        let mut rows: Vec<MatchupView> = self
            .matchups
            .iter()
            .filter(|m| m.cluster == cluster && m.team.as_deref() == Some(team.as_str()))
            .map(MatchupView::from)
            .collect();
        if rows.is_empty() {
            return LookupResult::EmptyTeam { cluster };
        }

        rows.sort_by(|a, b| b.proxy_war.total_cmp(&a.proxy_war));
        LookupResult::Matchups { cluster, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matchup(cluster: usize, team: &str, name: &str, proxy_war: f64) -> MatchupEntry {
        MatchupEntry {
            cluster,
            team: Some(team.into()),
            batter_full_name: Some(name.into()),
            batting_average: 0.250,
            slugging: 0.250,
            proxy_war,
            plate_appearances: 30,
            hits: 7,
        }
    }

    fn tables() -> LookupTables {
        LookupTables {
            pitchers: vec![
                PitcherEntry {
                    full_name: Some("Gerrit Cole".into()),
                    player_name: Some("Cole, Gerrit".into()),
                    cluster: 4,
                },
                PitcherEntry {
                    full_name: None,
                    player_name: Some("Gausman, Kevin".into()),
                    cluster: 2,
                },
            ],
            matchups: vec![
                matchup(4, "NYY", "Aaron Judge", 0.42),
                matchup(4, "NYY", "Juan Soto", 0.11),
                matchup(4, "BOS", "Rafael Devers", 0.55),
                matchup(4, "NYY", "Anthony Volpe", 0.30),
                matchup(2, "NYY", "Giancarlo Stanton", 0.90),
            ],
        }
    }

    fn wars(result: &LookupResult) -> Vec<f64> {
        match result {
            LookupResult::Matchups { rows, .. } => rows.iter().map(|r| r.proxy_war).collect(),
            other => panic!("expected matchups, got {other:?}"),
        }
    }

    #[test]
    fn cole_against_yankees_sorted_by_war() {
        let result = tables().query("Gerrit Cole", "NYY");
        assert_eq!(wars(&result), vec![0.42, 0.30, 0.11]);
        let LookupResult::Matchups { cluster, rows } = result else {
            unreachable!()
        };
        assert_eq!(cluster, 4);
        assert_eq!(rows[0].batter_full_name.as_deref(), Some("Aaron Judge"));
    }

    #[test]
    fn name_match_ignores_case_and_team_is_uppercased() {
        let result = tables().query("  gerrit COLE ", "nyy");
        assert_eq!(wars(&result), vec![0.42, 0.30, 0.11]);
    }

    #[test]
    fn statcast_spelling_also_matches() {
        let result = tables().query("Gausman, Kevin", "NYY");
        assert_eq!(wars(&result), vec![0.90]);
    }

    #[test]
    fn unknown_pitcher_is_no_match() {
        assert_eq!(tables().query("Nobody Special", "NYY"), LookupResult::NoMatch);
        assert_eq!(tables().query("", "NYY"), LookupResult::NoMatch);
    }

    #[test]
    fn known_pitcher_without_team_rows_is_empty_team() {
        assert_eq!(
            tables().query("Gerrit Cole", "SEA"),
            LookupResult::EmptyTeam { cluster: 4 }
        );
    }

    #[test]
    fn team_compare_is_exact_after_uppercasing() {
        assert_eq!(
            tables().query("Gerrit Cole", "NY"),
            LookupResult::EmptyTeam { cluster: 4 }
        );
    }

    #[test]
    fn negative_and_zero_war_sort_descending() {
        let tables = LookupTables {
            pitchers: tables().pitchers,
            matchups: vec![
                matchup(4, "SEA", "Julio Rodriguez", -0.25),
                matchup(4, "SEA", "Cal Raleigh", 0.0),
                matchup(4, "SEA", "Randy Arozarena", 0.18),
                matchup(4, "SEA", "J.P. Crawford", -0.02),
                matchup(4, "SEA", "Mitch Garver", 0.0),
            ],
        };
        let result = tables.query("Gerrit Cole", "SEA");
        assert_eq!(wars(&result), vec![0.18, 0.0, 0.0, -0.02, -0.25]);
        let LookupResult::Matchups { rows, .. } = result else {
            unreachable!()
        };
        // Ties keep their sheet order.
        assert_eq!(rows[1].batter_full_name.as_deref(), Some("Cal Raleigh"));
        assert_eq!(rows[2].batter_full_name.as_deref(), Some("Mitch Garver"));
    }
}
