//! Minimal deck-style run-configuration reader.
//!
//! This is a narrow internal convenience, not the external mesh-partitioner/
//! input-file preprocessor named as a non-goal: it knows nothing about mesh
//! adjacency or forcing-file formats, only the handful of scalar run
//! parameters a test or the CLI needs to build a [`RunConfig`].

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use crate::error::SolverError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub keyword: String,
    pub parameters: Vec<Parameter>,
    pub data_lines: Vec<String>,
    pub line_start: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckParseError {
    pub line: usize,
    pub message: String,
}

impl Display for DeckParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for DeckParseError {}

impl Deck {
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self, DeckParseError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| DeckParseError {
            line: 0,
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::parse_str(&raw)
    }

    pub fn parse_str(raw: &str) -> Result<Self, DeckParseError> {
        let lines: Vec<&str> = raw.lines().collect();
        let mut cards = Vec::new();
        let mut i = 0usize;

        while i < lines.len() {
            let trimmed = lines[i].trim();
            if trimmed.is_empty() || is_comment(trimmed) {
                i += 1;
                continue;
            }
            if !trimmed.starts_with('*') {
                return Err(DeckParseError {
                    line: i + 1,
                    message: "expected card starting with '*'".to_string(),
                });
            }

            let line_start = i + 1;
            let header = trimmed.trim_start_matches('*').trim().to_string();
            i += 1;

            let (keyword, parameters) = parse_header(&header, line_start)?;

            let mut data_lines = Vec::new();
            while i < lines.len() {
                let candidate = lines[i].trim();
                if candidate.is_empty() || is_comment(candidate) {
                    i += 1;
                    continue;
                }
                if candidate.starts_with('*') {
                    break;
                }
                data_lines.push(candidate.to_string());
                i += 1;
            }

            cards.push(Card {
                keyword,
                parameters,
                data_lines,
                line_start,
            });
        }

        Ok(Deck { cards })
    }

    pub fn card(&self, keyword: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.keyword == keyword)
    }
}

impl Card {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.value.as_deref())
    }

    pub fn flag(&self, key: &str) -> bool {
        self.param(key)
            .map(|v| matches!(v.to_ascii_uppercase().as_str(), "ON" | "TRUE" | "1"))
            .unwrap_or(false)
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with("**")
}

fn parse_header(header: &str, line: usize) -> Result<(String, Vec<Parameter>), DeckParseError> {
    let mut parts = header.split(',');
    let keyword_raw = parts.next().unwrap_or_default().trim();
    if keyword_raw.is_empty() {
        return Err(DeckParseError {
            line,
            message: "empty card keyword".to_string(),
        });
    }
    let keyword = keyword_raw.to_ascii_uppercase();
    let mut parameters = Vec::new();

    for part in parts {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        if let Some((k, v)) = item.split_once('=') {
            parameters.push(Parameter {
                key: k.trim().to_ascii_uppercase(),
                value: Some(v.trim().to_string()),
            });
        } else {
            parameters.push(Parameter {
                key: item.to_ascii_uppercase(),
                value: None,
            });
        }
    }

    Ok((keyword, parameters))
}

/// Forcing toggles for the SWE source kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForcingToggles {
    pub meteo: bool,
    pub tide: bool,
    pub coriolis: bool,
    pub manning: bool,
}

/// Typed run configuration assembled from a [`Deck`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub polynomial_order: usize,
    pub mesh_file: String,
    pub rk_stages: usize,
    pub rk_order: usize,
    pub dt: f64,
    pub t_end: f64,
    pub forcing: ForcingToggles,
    pub gn_alpha: Option<f64>,
    pub gn_tau: f64,
    pub slope_limit: bool,
}

impl RunConfig {
    pub fn from_deck(deck: &Deck) -> Result<Self, SolverError> {
        let order_card = deck
            .card("ORDER")
            .ok_or_else(|| SolverError::BadInput("missing *ORDER card".into()))?;
        let polynomial_order = order_card
            .data_lines
            .first()
            .ok_or_else(|| SolverError::BadInput("*ORDER card has no data line".into()))?
            .trim()
            .parse::<usize>()
            .map_err(|e| SolverError::BadInput(format!("invalid *ORDER value: {e}")))?;

        let mesh_card = deck
            .card("MESH")
            .ok_or_else(|| SolverError::BadInput("missing *MESH card".into()))?;
        let mesh_file = mesh_card
            .data_lines
            .first()
            .ok_or_else(|| SolverError::BadInput("*MESH card has no data line".into()))?
            .trim()
            .to_string();

        let rk_card = deck
            .card("RK")
            .ok_or_else(|| SolverError::BadInput("missing *RK card".into()))?;
        let rk_stages = parse_param(rk_card, "NSTAGES")?;
        let rk_order = parse_param(rk_card, "ORDER")?;

        let timestep_card = deck
            .card("TIMESTEP")
            .ok_or_else(|| SolverError::BadInput("missing *TIMESTEP card".into()))?;
        let dt = parse_param(timestep_card, "DT")?;
        let t_end = parse_param(timestep_card, "TEND")?;

        let forcing = deck
            .card("FORCING")
            .map(|c| ForcingToggles {
                meteo: c.flag("METEO"),
                tide: c.flag("TIDE"),
                coriolis: c.flag("CORIOLIS"),
                manning: c.flag("MANNING"),
            })
            .unwrap_or_default();

        let (gn_alpha, gn_tau, slope_limit) = match deck.card("DISPERSIVE") {
            Some(c) => (
                Some(parse_param(c, "ALPHA")?),
                c.param("TAU")
                    .map(|v| v.parse::<f64>())
                    .transpose()
                    .map_err(|e| SolverError::BadInput(format!("invalid TAU: {e}")))?
                    .unwrap_or(-20.0),
                c.flag("SLOPE_LIMIT"),
            ),
            None => (None, -20.0, false),
        };

        Ok(RunConfig {
            polynomial_order,
            mesh_file,
            rk_stages,
            rk_order,
            dt,
            t_end,
            forcing,
            gn_alpha,
            gn_tau,
            slope_limit,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SolverError> {
        let deck = Deck::parse_file(&path).map_err(|e| SolverError::BadInput(e.to_string()))?;
        Self::from_deck(&deck)
    }
}

fn parse_param<T>(card: &Card, key: &str) -> Result<T, SolverError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = card
        .param(key)
        .ok_or_else(|| SolverError::BadInput(format!("*{} missing {key}=", card.keyword)))?;
    raw.parse::<T>()
        .map_err(|e| SolverError::BadInput(format!("invalid {key} on *{}: {e}", card.keyword)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_cards_and_data() {
        let src = r#"
** comment
*ORDER
2
*MESH
channel.mesh
"#;
        let deck = Deck::parse_str(src).expect("parser should succeed");
        assert_eq!(deck.cards.len(), 2);
        assert_eq!(deck.cards[0].keyword, "ORDER");
        assert_eq!(deck.cards[1].data_lines[0], "channel.mesh");
    }

    #[test]
    fn fails_on_orphan_data_before_first_card() {
        let src = "2\n*ORDER\n2\n";
        let err = Deck::parse_str(src).expect_err("should fail");
        assert_eq!(err.line, 1);
    }

    fn full_deck() -> Deck {
        Deck::parse_str(
            r#"
*ORDER
2
*MESH
channel.mesh
*RK, NSTAGES=3, ORDER=3
*TIMESTEP, DT=0.1, TEND=10.0
*FORCING, TIDE=ON, CORIOLIS=OFF, MANNING=ON
*DISPERSIVE, ALPHA=1.0, TAU=-20.0
"#,
        )
        .unwrap()
    }

    #[test]
    fn builds_run_config_from_full_deck() {
        let deck = full_deck();
        let cfg = RunConfig::from_deck(&deck).expect("config should build");
        assert_eq!(cfg.polynomial_order, 2);
        assert_eq!(cfg.mesh_file, "channel.mesh");
        assert_eq!(cfg.rk_stages, 3);
        assert_eq!(cfg.rk_order, 3);
        assert_eq!(cfg.dt, 0.1);
        assert_eq!(cfg.t_end, 10.0);
        assert!(cfg.forcing.tide);
        assert!(!cfg.forcing.coriolis);
        assert!(cfg.forcing.manning);
        assert_eq!(cfg.gn_alpha, Some(1.0));
        assert!(!cfg.slope_limit);
    }

    #[test]
    fn missing_required_card_is_bad_input() {
        let deck = Deck::parse_str("*MESH\nchannel.mesh\n").unwrap();
        let err = RunConfig::from_deck(&deck).expect_err("should fail without *ORDER");
        assert!(matches!(err, SolverError::BadInput(_)));
    }
}
