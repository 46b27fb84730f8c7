//! Server and match configuration.
//!
//! Both are loaded from RON. Every field has a default so a partial file
//! is accepted.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use skirmish_core::capture::{CapturePoint, CapturePointConfig};
use skirmish_core::components::{PlayerId, TeamId};
use skirmish_core::data::UnitCatalog;
use skirmish_core::game_state::{GameState, Player, Team};
use skirmish_core::math::{Fixed, Vec2Fixed};
use skirmish_core::navigation::OpenGround;
use skirmish_core::simulation::{Simulation, TICK_RATE};
use skirmish_core::spatial::{Obstacle, MAX_TEAMS};
use tracing::info;

use crate::error::{Result, ServerError};

fn to_point((x, y): (f64, f64)) -> Vec2Fixed {
    Vec2Fixed::new(Fixed::saturating_from_num(x), Fixed::saturating_from_num(y))
}

/// A player slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Slot id clients claim with `Hello`.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
}

/// A unit placed at match start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpawn {
    /// Catalog template id.
    pub type_id: String,
    /// Owning player.
    pub player: PlayerId,
    /// Spawn position.
    pub position: (f64, f64),
}

/// A team and its starting forces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Team id.
    pub id: TeamId,
    /// Player slots.
    #[serde(default)]
    pub players: Vec<PlayerConfig>,
    /// Starting units.
    #[serde(default)]
    pub units: Vec<UnitSpawn>,
}

/// Static blocking geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ObstacleConfig {
    /// Round obstacle.
    Circle {
        /// Center.
        center: (f64, f64),
        /// Radius.
        radius: f64,
    },
    /// Axis-aligned box.
    Rect {
        /// Minimum corner.
        min: (f64, f64),
        /// Maximum corner.
        max: (f64, f64),
    },
}

impl ObstacleConfig {
    /// Convert to simulation geometry.
    #[must_use]
    pub fn to_obstacle(self) -> Obstacle {
        match self {
            Self::Circle { center, radius } => Obstacle::Circle {
                center: to_point(center),
                radius: Fixed::saturating_from_num(radius),
            },
            Self::Rect { min, max } => Obstacle::Rect {
                min: to_point(min),
                max: to_point(max),
            },
        }
    }
}

/// Everything needed to set up one match.
///
/// # Example RON
///
/// ```ron
/// MatchConfig(
///     teams: [
///         TeamConfig(id: 1, players: [PlayerConfig(id: 1, name: "red")],
///             units: [UnitSpawn(type_id: "trooper", player: 1, position: (-20.0, 0.0))]),
///         TeamConfig(id: 2, players: [PlayerConfig(id: 2, name: "blue")],
///             units: [UnitSpawn(type_id: "trooper", player: 2, position: (20.0, 0.0))]),
///     ],
///     score_limit: Some(100),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Teams with player slots and starting units.
    pub teams: Vec<TeamConfig>,
    /// Capture points.
    pub capture_points: Vec<CapturePointConfig>,
    /// Static obstacles.
    pub obstacles: Vec<ObstacleConfig>,
    /// Walkable area minimum corner.
    pub map_min: (f64, f64),
    /// Walkable area maximum corner.
    pub map_max: (f64, f64),
    /// Score that wins the match.
    pub score_limit: Option<u32>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            teams: vec![
                TeamConfig {
                    id: 1,
                    players: vec![PlayerConfig {
                        id: 1,
                        name: "red".to_string(),
                    }],
                    units: Vec::new(),
                },
                TeamConfig {
                    id: 2,
                    players: vec![PlayerConfig {
                        id: 2,
                        name: "blue".to_string(),
                    }],
                    units: Vec::new(),
                },
            ],
            capture_points: Vec::new(),
            obstacles: Vec::new(),
            map_min: (-250.0, -250.0),
            map_max: (250.0, 250.0),
            score_limit: None,
        }
    }
}

impl MatchConfig {
    /// Check roster consistency against a catalog.
    ///
    /// Returns a list of validation errors.
    #[must_use]
    pub fn validate(&self, catalog: &UnitCatalog) -> Vec<String> {
        let mut errors = Vec::new();
        let mut team_ids = BTreeSet::new();
        let mut player_ids = BTreeSet::new();

        if self.teams.len() < 2 {
            errors.push("A match needs at least two teams".to_string());
        }
        for team in &self.teams {
            if !team_ids.insert(team.id) {
                errors.push(format!("Duplicate team id {}", team.id));
            }
            if team.id >= MAX_TEAMS {
                errors.push(format!(
                    "Team id {} exceeds the supported maximum of {}",
                    team.id,
                    MAX_TEAMS - 1
                ));
            }
            if team.players.is_empty() {
                errors.push(format!("Team {} has no player slots", team.id));
            }
            for player in &team.players {
                if !player_ids.insert(player.id) {
                    errors.push(format!("Duplicate player id {}", player.id));
                }
            }
        }
        for team in &self.teams {
            for unit in &team.units {
                if !team.players.iter().any(|p| p.id == unit.player) {
                    errors.push(format!(
                        "Unit '{}' belongs to player {} who is not on team {}",
                        unit.type_id, unit.player, team.id
                    ));
                }
                if catalog.get_unit(&unit.type_id).is_none() {
                    errors.push(format!("Unknown unit type '{}'", unit.type_id));
                }
            }
        }
        let mut point_ids = BTreeSet::new();
        for point in &self.capture_points {
            if !point_ids.insert(point.id) {
                errors.push(format!("Duplicate capture point id {}", point.id));
            }
        }
        if self.map_min.0 >= self.map_max.0 || self.map_min.1 >= self.map_max.1 {
            errors.push("Map bounds are empty".to_string());
        }

        errors
    }

    /// Build a simulation waiting for players.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] if validation fails, or a
    /// game error if a unit cannot be spawned.
    pub fn build_simulation(&self, catalog: &UnitCatalog) -> Result<Simulation> {
        let errors = self.validate(catalog);
        if !errors.is_empty() {
            return Err(ServerError::InvalidConfig(errors.join("; ")));
        }

        let teams = self.teams.iter().map(|t| {
            t.players.iter().fold(Team::new(t.id), |team, p| {
                team.with_player(Player::new(p.id, p.name.clone()))
            })
        });
        let mut game = GameState::new(teams);
        game.score_limit = self.score_limit;

        let mut sim = Simulation::new(game);
        sim.set_navigation(OpenGround::new(to_point(self.map_min), to_point(self.map_max)));
        for obstacle in &self.obstacles {
            sim.spatial_mut().add_obstacle(obstacle.to_obstacle());
        }
        for point in &self.capture_points {
            sim.add_capture_point(CapturePoint::from_config(point));
        }
        for team in &self.teams {
            for unit in &team.units {
                sim.spawn_entity(catalog, &unit.type_id, unit.player, to_point(unit.position))?;
            }
        }

        info!(
            "Built match with {} teams, {} entities, {} capture points",
            self.teams.len(),
            sim.registry().len(),
            self.capture_points.len()
        );
        Ok(sim)
    }
}

/// Dedicated server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP port to listen on.
    pub port: u16,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Ticks between snapshot broadcasts.
    pub snapshot_interval: u32,
    /// DER-encoded certificate chain leaf.
    pub cert_path: PathBuf,
    /// DER-encoded PKCS#8 private key.
    pub key_path: PathBuf,
    /// Unit catalog RON file.
    pub catalog_path: PathBuf,
    /// Match definition.
    pub match_config: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7777,
            tick_rate: TICK_RATE,
            snapshot_interval: 1,
            cert_path: PathBuf::from("cert.der"),
            key_path: PathBuf::from("key.der"),
            catalog_path: PathBuf::from("catalog.ron"),
            match_config: MatchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load a config from a RON file. Relative paths inside the file are
    /// resolved against its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not valid RON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ServerError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = ron::from_str(&contents)?;
        if config.tick_rate == 0 {
            return Err(ServerError::InvalidConfig("tick_rate must be positive".to_string()));
        }
        config.snapshot_interval = config.snapshot_interval.max(1);

        if let Some(dir) = path.parent() {
            for file in [
                &mut config.cert_path,
                &mut config.key_path,
                &mut config.catalog_path,
            ] {
                if file.is_relative() {
                    *file = dir.join(&*file);
                }
            }
        }
        Ok(config)
    }

    /// Load the unit catalog named by `catalog_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or the catalog is invalid.
    pub fn load_catalog(&self) -> Result<UnitCatalog> {
        if !self.catalog_path.exists() {
            return Err(ServerError::FileNotFound(
                self.catalog_path.display().to_string(),
            ));
        }
        let contents = std::fs::read_to_string(&self.catalog_path)?;
        let source = self.catalog_path.display().to_string();
        Ok(UnitCatalog::from_ron_str(&source, &contents)?)
    }

    /// Seconds per tick.
    #[must_use]
    pub fn tick_dt(&self) -> Fixed {
        Fixed::ONE / Fixed::from_num(self.tick_rate.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::game_state::MatchPhase;
    use skirmish_test_utils::fixtures::test_catalog;
    use std::io::Write;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.ron");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "ServerConfig(port: 9000)").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.tick_rate, TICK_RATE);
        assert_eq!(config.catalog_path, dir.path().join("catalog.ron"));
        assert_eq!(config.match_config.teams.len(), 2);
    }

    #[test]
    fn test_sample_config_builds() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/server.ron");
        let config = ServerConfig::load(path).unwrap();
        let catalog = config.load_catalog().unwrap();
        assert!(config.match_config.validate(&catalog).is_empty());

        let sim = config.match_config.build_simulation(&catalog).unwrap();
        assert_eq!(sim.registry().len(), 12);
        assert_eq!(sim.capture_points().len(), 3);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServerConfig::load("/nonexistent/server.ron"),
            Err(ServerError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_build_simulation() {
        let config: MatchConfig = ron::from_str(
            r#"MatchConfig(
                teams: [
                    TeamConfig(id: 1, players: [PlayerConfig(id: 1, name: "red")],
                        units: [UnitSpawn(type_id: "trooper", player: 1, position: (-20.0, 0.0))]),
                    TeamConfig(id: 2, players: [PlayerConfig(id: 2, name: "blue")],
                        units: [UnitSpawn(type_id: "turret", player: 2, position: (20.0, 0.0))]),
                ],
                capture_points: [CapturePointConfig(id: 1, position: (0.0, 0.0), radius: 5.0,
                    capture_time: 4.0, gain: Score, gain_amount: 1, gain_interval: 1.0)],
                obstacles: [Rect(min: (-2.0, 10.0), max: (2.0, 12.0))],
                score_limit: Some(50),
            )"#,
        )
        .unwrap();

        let sim = config.build_simulation(&test_catalog()).unwrap();
        assert_eq!(sim.registry().len(), 2);
        assert_eq!(sim.capture_points().len(), 1);
        assert_eq!(sim.game().phase(), MatchPhase::WaitingForPlayers);
        assert_eq!(sim.game().score_limit, Some(50));
    }

    #[test]
    fn test_validation_catches_roster_errors() {
        let mut config = MatchConfig::default();
        config.teams[1].players[0].id = 1;
        config.teams[0].units.push(UnitSpawn {
            type_id: "dragon".to_string(),
            player: 1,
            position: (0.0, 0.0),
        });
        let errors = config.validate(&test_catalog());
        assert!(errors.iter().any(|e| e.contains("Duplicate player id 1")));
        assert!(errors.iter().any(|e| e.contains("Unknown unit type 'dragon'")));
        assert!(matches!(
            config.build_simulation(&test_catalog()),
            Err(ServerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validation_rejects_team_ids_without_a_layer() {
        let mut config = MatchConfig::default();
        config.teams[1].id = MAX_TEAMS + 1;
        let errors = config.validate(&test_catalog());
        assert!(errors
            .iter()
            .any(|e| e.contains(&format!("Team id {} exceeds", MAX_TEAMS + 1))));

        config.teams[1].id = MAX_TEAMS - 1;
        assert!(config.validate(&test_catalog()).is_empty());
    }
}
