//! Typed engine configuration. Unlike a stringly-typed UCI option map,
//! every tunable is a concrete field on `EngineConfig`; the only place
//! strings are involved is `apply_uci_option`, the boundary where the
//! UCI front-end's `setoption name X value Y` gets translated -- and an
//! unrecognized name there is a load error, not a silently-ignored
//! no-op.

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOrderMode {
    MvvLvaOnly,
    KillersOnly,
    Composite,
}

// Single-threaded search can run either plain fail-soft Negamax or
// Principal Variation Search; Lazy SMP always runs plain Negamax per
// worker (PVS's null-window re-searches would just add noise on top
// of the already-nondeterministic worker scheduling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    NegamaxSingle,
    NegamaxSmp { workers: usize },
    PvsSingle,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_depth: i32,
    pub tt_enabled: bool,
    pub tt_capacity_log2: u32,
    pub null_move: bool,
    pub futility: bool,
    pub delta: bool,
    pub aspiration: bool,
    pub move_order: MoveOrderMode,
    pub mvv_lva_weight: i32,
    pub killer_weight: i32,
    pub search_mode: SearchMode,
    pub time_weight: f64,
    pub increment_weight: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_depth: 64,
            tt_enabled: true,
            tt_capacity_log2: 20,
            null_move: true,
            futility: true,
            delta: true,
            aspiration: true,
            move_order: MoveOrderMode::Composite,
            mvv_lva_weight: 1,
            killer_weight: 1,
            search_mode: SearchMode::PvsSingle,
            time_weight: 0.02,
            increment_weight: 0.5,
        }
    }
}

impl EngineConfig {
    // Apply a single `setoption name <name> value <value>` pair. Returns
    // `EngineError::UnknownOption` for anything not in this list, per
    // the typed-configuration contract -- no unrecognized option is
    // ever silently dropped.
    pub fn apply_uci_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        match name.to_ascii_lowercase().as_str() {
            "hash" => {
                let mb: u64 = value.parse().map_err(|_| EngineError::UnknownOption(name.to_string()))?;
                // Each slot is 16 bytes; pick the largest power-of-two
                // slot count that fits in the requested megabytes.
                let slots = (mb * 1024 * 1024 / 16).max(1);
                self.tt_capacity_log2 = 63 - slots.leading_zeros();
            }
            "threads" => {
                let workers: usize = value.parse().map_err(|_| EngineError::UnknownOption(name.to_string()))?;
                self.search_mode = if workers <= 1 {
                    match self.search_mode {
                        SearchMode::PvsSingle => SearchMode::PvsSingle,
                        _ => SearchMode::NegamaxSingle,
                    }
                } else {
                    SearchMode::NegamaxSmp { workers }
                };
            }
            "searchmode" => {
                self.search_mode = match value.to_ascii_lowercase().as_str() {
                    "negamax" => match self.search_mode {
                        SearchMode::NegamaxSmp { workers } => SearchMode::NegamaxSmp { workers },
                        _ => SearchMode::NegamaxSingle,
                    },
                    "pvs" => SearchMode::PvsSingle,
                    _ => return Err(EngineError::UnknownOption(format!("{}={}", name, value))),
                };
            }
            "nullmove" => {
                self.null_move = parse_bool(value)?;
            }
            "futility" => {
                self.futility = parse_bool(value)?;
            }
            "aspirationwindow" => {
                self.aspiration = parse_bool(value)?;
            }
            "moveorder" => {
                self.move_order = match value.to_ascii_lowercase().as_str() {
                    "mvvlva" => MoveOrderMode::MvvLvaOnly,
                    "killers" => MoveOrderMode::KillersOnly,
                    "composite" => MoveOrderMode::Composite,
                    _ => return Err(EngineError::UnknownOption(format!("{}={}", name, value))),
                };
            }
            _ => return Err(EngineError::UnknownOption(name.to_string())),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool, EngineError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(EngineError::UnknownOption(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_option_is_an_error() {
        let mut config = EngineConfig::default();
        assert!(config.apply_uci_option("MadeUpOption", "1").is_err());
    }

    #[test]
    fn test_known_option_updates_config() {
        let mut config = EngineConfig::default();
        config.apply_uci_option("Threads", "4").unwrap();
        assert_eq!(config.search_mode, SearchMode::NegamaxSmp { workers: 4 });
    }

    #[test]
    fn test_searchmode_option_selects_negamax_or_pvs_single_threaded() {
        let mut config = EngineConfig::default();
        config.apply_uci_option("SearchMode", "negamax").unwrap();
        assert_eq!(config.search_mode, SearchMode::NegamaxSingle);
        config.apply_uci_option("SearchMode", "pvs").unwrap();
        assert_eq!(config.search_mode, SearchMode::PvsSingle);
    }

    #[test]
    fn test_threads_then_back_to_one_keeps_negamax_single() {
        let mut config = EngineConfig::default();
        config.apply_uci_option("Threads", "4").unwrap();
        config.apply_uci_option("Threads", "1").unwrap();
        assert_eq!(config.search_mode, SearchMode::NegamaxSingle);
    }
}
