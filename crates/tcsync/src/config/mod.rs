//! Game table loading and validation.
//!
//! A game table is a TOML document describing one title: where the engine
//! reads and persists state, what every capability does, which areas and
//! bits it unlocks, and how locations are detected. Loading validates the
//! whole table up front and fails on the first problem found.

mod timing;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::capability::{CapabilityDef, CapabilityId, EffectTable};
use crate::error::{ConfigError, Result};
use crate::graph::{AreaDef, UnlockDependencyGraph};
use crate::memory::Field;
use crate::memory::layout::expected_index;
use crate::poll::{LocationId, LocationPollSet, LocationRule};
use crate::process::ProcessConfig;
use crate::reconcile::{BitRegion, BitfieldReconciler, RegionDef, ShopDef, ShopOverride};
use crate::report::GoalDef;

pub use timing::TimingConfig;

type Validation = std::result::Result<(), ConfigError>;

/// Persisted expected-index field: ASCII digits, NUL padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IndexField {
    pub offset: u64,
    #[serde(default = "default_index_width")]
    pub width: usize,
}

fn default_index_width() -> usize {
    expected_index::WIDTH
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameSection {
    #[serde(default)]
    pub name: String,
    /// Non-zero while a save is loaded (the current level id).
    pub in_game: Field,
    pub expected_index: IndexField,
}

/// A game table as written on disk, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct GameTable {
    pub game: GameSection,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub capabilities: Vec<CapabilityDef>,
    #[serde(default)]
    pub regions: Vec<RegionDef>,
    #[serde(default)]
    pub areas: Vec<AreaDef>,
    #[serde(default)]
    pub shops: Vec<ShopDef>,
    #[serde(default)]
    pub locations: Vec<LocationRule>,
    #[serde(default)]
    pub goal: Option<GoalDef>,
    #[serde(default)]
    pub process: Option<ProcessConfig>,
}

/// A validated game table. Immutable once built.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub game: GameSection,
    pub timing: TimingConfig,
    pub effects: EffectTable,
    /// Region layouts with ownership applied; desired values all locked.
    pub regions: Vec<BitRegion>,
    pub areas: Vec<AreaDef>,
    pub shops: Vec<ShopDef>,
    pub locations: Vec<LocationRule>,
    pub goal: Option<GoalDef>,
    pub process: Option<ProcessConfig>,
}

impl SyncConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading game table from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let table: GameTable = toml::from_str(text)?;
        Ok(Self::from_table(table)?)
    }

    pub fn from_table(table: GameTable) -> std::result::Result<Self, ConfigError> {
        validate_game(&table.game)?;
        let regions = build_regions(&table)?;
        validate_capabilities(&table.capabilities)?;
        validate_areas(&table.areas, &table.capabilities)?;
        validate_shops(&table.shops, &regions)?;
        validate_locations(&table.locations)?;
        if let Some(goal) = &table.goal {
            validate_goal(goal, &table.capabilities, &table.areas)?;
        }

        Ok(Self {
            game: table.game,
            timing: table.timing,
            effects: EffectTable::new(table.capabilities),
            regions,
            areas: table.areas,
            shops: table.shops,
            locations: table.locations,
            goal: table.goal,
            process: table.process,
        })
    }

    pub fn reconciler(&self) -> BitfieldReconciler {
        BitfieldReconciler::new(self.regions.clone())
    }

    pub fn graph(&self) -> UnlockDependencyGraph {
        UnlockDependencyGraph::new(&self.areas)
    }

    pub fn poll_set(&self) -> LocationPollSet {
        LocationPollSet::from_rules(&self.locations)
    }

    pub fn shop_overrides(&self) -> Vec<ShopOverride> {
        self.shops.iter().cloned().map(ShopOverride::new).collect()
    }

    pub fn location_count(&self) -> usize {
        self.locations.iter().map(|rule| rule.locations().len()).sum()
    }
}

fn validate_game(game: &GameSection) -> Validation {
    game.in_game.validate()?;
    let width = game.expected_index.width;
    if width == 0 || width > expected_index::WIDTH {
        return Err(ConfigError::Invalid(format!(
            "expected_index width {} must be between 1 and {}",
            width,
            expected_index::WIDTH
        )));
    }
    Ok(())
}

/// Check that `bit` exists in `region`, returning the region's index.
fn check_bit(
    regions: &[BitRegion],
    by_name: &HashMap<&str, usize>,
    owner: &str,
    region: &str,
    bit: u32,
) -> std::result::Result<usize, ConfigError> {
    let Some(&index) = by_name.get(region) else {
        return Err(ConfigError::UnknownRegion {
            owner: owner.to_string(),
            region: region.to_string(),
        });
    };
    let bits = regions[index].bit_len();
    if bit >= bits {
        return Err(ConfigError::BitOutOfRange {
            owner: owner.to_string(),
            region: region.to_string(),
            bit,
            bits,
        });
    }
    Ok(index)
}

/// Lay out regions and mark every bit driven by a capability, an area, or a
/// region's own `owned_bits` and `forced_bits` lists as owned.
fn build_regions(table: &GameTable) -> std::result::Result<Vec<BitRegion>, ConfigError> {
    let mut regions = Vec::with_capacity(table.regions.len());
    let mut seen = HashSet::new();
    for def in &table.regions {
        if !seen.insert(def.name.as_str()) {
            return Err(ConfigError::DuplicateRegion(def.name.clone()));
        }
        if def.length == 0 {
            return Err(ConfigError::Invalid(format!(
                "region '{}' has zero length",
                def.name
            )));
        }
        regions.push(BitRegion::new(&def.name, def.offset, def.length));
    }
    let by_name: HashMap<&str, usize> = table
        .regions
        .iter()
        .enumerate()
        .map(|(i, def)| (def.name.as_str(), i))
        .collect();

    let mut claims: HashMap<(String, u32), String> = HashMap::new();
    let mut claim = |region: &str, bit: u32, owner: String| -> Validation {
        let key = (region.to_string(), bit);
        if let Some(first) = claims.get(&key) {
            if *first != owner {
                return Err(ConfigError::ConflictingBit {
                    region: region.to_string(),
                    bit,
                    first: first.clone(),
                    second: owner,
                });
            }
            return Ok(());
        }
        claims.insert(key, owner);
        Ok(())
    };

    for def in &table.capabilities {
        let owner = format!("capability {}", def.id);
        for (region, bit) in def.effect.region_bits() {
            let index = check_bit(&regions, &by_name, &owner, region, bit)?;
            claim(region, bit, owner.clone())?;
            regions[index].own_bit(bit);
        }
    }
    for area in &table.areas {
        if let Some(unlock) = &area.unlock {
            let owner = format!("area '{}'", area.id);
            let index = check_bit(&regions, &by_name, &owner, &unlock.region, unlock.bit)?;
            claim(&unlock.region, unlock.bit, owner)?;
            regions[index].own_bit(unlock.bit);
        }
    }
    for def in &table.regions {
        let owner = format!("region '{}'", def.name);
        for &bit in &def.owned_bits {
            let index = check_bit(&regions, &by_name, &owner, &def.name, bit)?;
            regions[index].own_bit(bit);
        }
        let owner = format!("region '{}' forced", def.name);
        for &bit in &def.forced_bits {
            let index = check_bit(&regions, &by_name, &owner, &def.name, bit)?;
            claim(&def.name, bit, owner.clone())?;
            regions[index].force_bit(bit);
        }
    }

    for region in &regions {
        debug!(
            "Region '{}': {} of {} bits owned",
            region.name(),
            region.owned_bit_count(),
            region.bit_len()
        );
    }
    Ok(regions)
}

fn validate_capabilities(capabilities: &[CapabilityDef]) -> Validation {
    let mut seen = HashSet::new();
    for def in capabilities {
        if !seen.insert(def.id) {
            return Err(ConfigError::DuplicateCapability(def.id));
        }
    }
    Ok(())
}

fn validate_areas(areas: &[AreaDef], capabilities: &[CapabilityDef]) -> Validation {
    let known: HashSet<CapabilityId> = capabilities.iter().map(|def| def.id).collect();
    let mut seen = HashSet::new();
    for area in areas {
        if !seen.insert(area.id.as_str()) {
            return Err(ConfigError::DuplicateArea(area.id.clone()));
        }
        let counted = area.counted.iter().map(|counted| &counted.capability);
        if let Some(&capability) = area
            .requires
            .iter()
            .chain(counted)
            .find(|cap| !known.contains(cap))
        {
            return Err(ConfigError::UnknownCapability {
                area: area.id.clone(),
                capability,
            });
        }
        if let Some(counted) = &area.counted
            && counted.at_least == 0
        {
            return Err(ConfigError::Invalid(format!(
                "area '{}' counts capability {} zero times",
                area.id, counted.capability
            )));
        }
    }
    Ok(())
}

fn validate_shops(shops: &[ShopDef], regions: &[BitRegion]) -> Validation {
    for shop in shops {
        let owner = format!("shop '{}'", shop.name);
        let Some(region) = regions.iter().find(|r| r.name() == shop.unlock_region) else {
            return Err(ConfigError::UnknownRegion {
                owner,
                region: shop.unlock_region.clone(),
            });
        };
        if shop.purchase_length == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} has an empty purchase record",
                owner
            )));
        }
        shop.active_slot.validate()?;
        for gate in &shop.gates {
            gate.field().validate()?;
        }
        if let Some(&bit) = shop
            .slots
            .iter()
            .flatten()
            .find(|&&bit| bit >= region.bit_len())
        {
            return Err(ConfigError::BitOutOfRange {
                owner,
                region: region.name().to_string(),
                bit,
                bits: region.bit_len(),
            });
        }
    }
    Ok(())
}

fn validate_window(name: &str, length: usize, at: usize, width: usize) -> Validation {
    Field::new(0, width).validate()?;
    match at.checked_add(width) {
        Some(end) if end <= length => Ok(()),
        Some(end) => Err(ConfigError::Invalid(format!(
            "poll rule '{}' reads {}..{} outside its {}-byte window",
            name, at, end, length
        ))),
        None => Err(ConfigError::Invalid(format!(
            "poll rule '{}' field at {} overflows",
            name, at
        ))),
    }
}

fn validate_locations(rules: &[LocationRule]) -> Validation {
    let mut seen: BTreeSet<LocationId> = BTreeSet::new();
    for rule in rules {
        let locations = rule.locations();
        if locations.is_empty() {
            return Err(ConfigError::EmptyRule(rule.name().to_string()));
        }
        if let Some(&duplicate) = locations.iter().find(|&&id| !seen.insert(id)) {
            return Err(ConfigError::DuplicateLocation(duplicate));
        }

        match rule {
            LocationRule::Threshold { nodes, .. } => {
                for node in nodes {
                    Field::new(node.offset, node.width).validate()?;
                }
            }
            LocationRule::Flag { .. } => {}
            LocationRule::Bits {
                name, length, bits, ..
            } => {
                let limit = (*length as u32) * 8;
                if let Some(b) = bits.iter().find(|b| b.bit >= limit) {
                    return Err(ConfigError::BitOutOfRange {
                        owner: format!("poll rule '{}'", name),
                        region: name.clone(),
                        bit: b.bit,
                        bits: limit,
                    });
                }
            }
            LocationRule::Gated {
                name,
                length,
                selector,
                gates,
                ..
            } => {
                validate_window(name, *length, selector.at, selector.width)?;
                for gate in gates {
                    validate_window(name, *length, gate.at, gate.width)?;
                }
            }
        }
    }
    Ok(())
}

fn validate_goal(goal: &GoalDef, capabilities: &[CapabilityDef], areas: &[AreaDef]) -> Validation {
    let known: HashSet<CapabilityId> = capabilities.iter().map(|def| def.id).collect();
    if let Some(req) = goal
        .capabilities
        .iter()
        .find(|req| !known.contains(&req.capability))
    {
        return Err(ConfigError::UnknownGoalCapability(req.capability));
    }
    if let Some(req) = goal.capabilities.iter().find(|req| req.weight == 0) {
        return Err(ConfigError::Invalid(format!(
            "goal capability {} has zero weight",
            req.capability
        )));
    }
    if let Some(area) = goal
        .areas
        .iter()
        .find(|id| !areas.iter().any(|area| &area.id == *id))
    {
        return Err(ConfigError::UnknownGoalArea(area.clone()));
    }
    if let Some(display) = &goal.display
        && goal.target(display.capability).is_none()
    {
        return Err(ConfigError::Invalid(format!(
            "goal display tracks capability {} which the goal does not count",
            display.capability
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::Error;

    const TABLE: &str = r#"
[game]
name = "LEGO Star Wars: The Complete Saga"
in_game = { offset = 0x951BA0, width = 2 }
expected_index = { offset = 0x86E500 }

[timing]
poll_interval_ms = 50

[[regions]]
name = "levels"
offset = 0x86E4C8
length = 4
forced_bits = [8]

[[regions]]
name = "extras"
offset = 0x86E4E4
length = 8
owned_bits = [20]

[[capabilities]]
id = 1
name = "Episode 1 Unlock"
effect = { kind = "unlock" }

[[capabilities]]
id = 2
name = "Super Gonk"
effect = { kind = "bit", region = "extras", bit = 3 }

[[capabilities]]
id = 3
name = "Progressive Score Multiplier"
effect = { kind = "progressive", region = "extras", bits = [5, 6, 7] }

[[capabilities]]
id = 4
name = "Purple Stud"
effect = { kind = "consumable", offset = 0x86E4DC, amount = 10000, max = 4000000000 }

[[capabilities]]
id = 5
name = "Minikit Bundle"
effect = { kind = "counter" }

[[areas]]
id = "episode_1"
requires = [1]
unlock = { region = "levels", bit = 0 }

[[areas]]
id = "cantina"

[[shops]]
name = "extras"
unlock_region = "extras"
purchase_offset = 0x86E4EC
purchase_length = 8
active_slot = { offset = 0x87BDF8 }
gates = [{ offset = 0x951BA0, width = 2, equals = 325 }]

[[locations]]
kind = "threshold"
name = "minikits"
nodes = [{ offset = 0x100, thresholds = [{ location = 100, at_least = 10 }] }]

[[locations]]
kind = "flag"
name = "true_jedi"
flags = [{ offset = 0x103, location = 101 }]

[goal]
capabilities = [{ capability = 5, count = 2 }]
areas = ["episode_1"]
display = { offset = 0x86E538, capability = 5 }

[process]
name = "LEGOStarWarsSaga.exe"
version_pattern = [0x0F, 0xBE, 0xAE, 0x7F, 0x10, 0x00, 0x00]
reference_address = 0x4B894C
known_builds = [{ name = "Steam", offset = 0 }, { name = "GOG", offset = 0x20 }]
"#;

    fn table() -> GameTable {
        toml::from_str(TABLE).unwrap()
    }

    #[test]
    fn test_load_full_table() {
        let config = SyncConfig::from_toml(TABLE).unwrap();
        assert_eq!(config.game.expected_index.width, expected_index::WIDTH);
        assert_eq!(config.game.in_game, Field::new(0x951BA0, 2));
        assert_eq!(config.timing.poll_interval_ms, 50);
        assert_eq!(config.effects.len(), 5);
        assert_eq!(config.location_count(), 2);
        assert!(config.process.is_some());

        let reconciler = config.reconciler();
        let extras = reconciler.region("extras").unwrap();
        // capability bits, progressive steps, and the region's own list
        for bit in [3, 5, 6, 7, 20] {
            assert!(extras.is_owned(bit), "bit {bit} should be owned");
        }
        assert!(!extras.is_owned(4));
        assert!(reconciler.is_owned("levels", 0));
        assert!(reconciler.is_owned("levels", 8));
        assert!(reconciler.desired("levels", 8));
        assert!(!reconciler.desired("levels", 0));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.areas.len(), 2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_malformed_toml_is_toml_error() {
        let err = SyncConfig::from_toml("[game\n").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_area_with_unknown_capability() {
        let mut table = table();
        table.areas[0].requires.push(CapabilityId(99));
        assert_eq!(
            SyncConfig::from_table(table).unwrap_err(),
            ConfigError::UnknownCapability {
                area: "episode_1".to_string(),
                capability: CapabilityId(99)
            }
        );
    }

    #[test]
    fn test_duplicate_ids() {
        let mut table = table();
        let first = table.capabilities[0].clone();
        table.capabilities.push(first);
        assert_eq!(
            SyncConfig::from_table(table).unwrap_err(),
            ConfigError::DuplicateCapability(CapabilityId(1))
        );

        let mut table = self::table();
        let first = table.areas[0].clone();
        table.areas.push(first);
        assert_eq!(
            SyncConfig::from_table(table).unwrap_err(),
            ConfigError::DuplicateArea("episode_1".to_string())
        );
    }

    #[test]
    fn test_bit_outside_region() {
        let text = TABLE.replace("bit = 3 }", "bit = 64 }");
        let err = SyncConfig::from_toml(&text).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::BitOutOfRange { bit: 64, bits: 64, .. })
        ));
    }

    #[test]
    fn test_unknown_region() {
        let text = TABLE.replace(r#"region = "levels", bit = 0"#, r#"region = "hub", bit = 0"#);
        let err = SyncConfig::from_toml(&text).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnknownRegion { region, .. }) if region == "hub"
        ));
    }

    #[test]
    fn test_bit_claimed_by_area_and_capability() {
        let text = TABLE.replace(r#"region = "levels", bit = 0"#, r#"region = "extras", bit = 3"#);
        let err = SyncConfig::from_toml(&text).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::ConflictingBit { bit: 3, .. })
        ));
    }

    #[test]
    fn test_duplicate_location() {
        let text = TABLE.replace("location = 101", "location = 100");
        let err = SyncConfig::from_toml(&text).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::DuplicateLocation(LocationId(100)))
        ));
    }

    #[test]
    fn test_unsupported_width() {
        let text = TABLE.replace("offset = 0x951BA0, width = 2 }", "offset = 0x951BA0, width = 3 }");
        let err = SyncConfig::from_toml(&text).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnsupportedWidth(3))
        ));
    }

    #[test]
    fn test_goal_references_checked() {
        let mut table = table();
        if let Some(goal) = table.goal.as_mut() {
            goal.areas.push("hoth".to_string());
        }
        assert_eq!(
            SyncConfig::from_table(table).unwrap_err(),
            ConfigError::UnknownGoalArea("hoth".to_string())
        );
    }

    #[test]
    fn test_minimal_table() {
        let config = SyncConfig::from_toml(
            r#"
[game]
in_game = { offset = 0x10, width = 2 }
expected_index = { offset = 0x20 }
"#,
        )
        .unwrap();
        assert!(config.effects.is_empty());
        assert!(config.goal.is_none());
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn test_forced_bit_conflicts_with_area_unlock() {
        let text = TABLE.replace(r#"region = "levels", bit = 0"#, r#"region = "levels", bit = 8"#);
        let err = SyncConfig::from_toml(&text).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::ConflictingBit { bit: 8, .. })
        ));
    }

    #[test]
    fn test_byte_effect_claims_every_bit() {
        let byte_effect = |byte: usize| {
            TABLE.replace(
                r#"effect = { kind = "bit", region = "extras", bit = 3 }"#,
                &format!(r#"effect = {{ kind = "byte", region = "extras", byte = {byte}, value = 3 }}"#),
            )
        };
        let config = SyncConfig::from_toml(&byte_effect(1)).unwrap();
        let reconciler = config.reconciler();
        assert_eq!(reconciler.region("extras").unwrap().owned()[1], 0xFF);

        // byte 0 holds the progressive bits 5..7
        let err = SyncConfig::from_toml(&byte_effect(0)).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::ConflictingBit { bit: 5, .. })
        ));
    }

    #[test]
    fn test_counted_area_validated() {
        let text = TABLE.replace(
            "[[areas]]\nid = \"cantina\"",
            "[[areas]]\nid = \"cantina\"\ncounted = { capability = 5, at_least = 2 }",
        );
        let config = SyncConfig::from_toml(&text).unwrap();
        let mut graph = config.graph();
        assert!(!graph.is_unlocked("cantina"));
        graph.on_capability_granted(CapabilityId(5));
        graph.on_capability_granted(CapabilityId(5));
        assert!(graph.is_unlocked("cantina"));

        let unknown = text.replace("capability = 5, at_least = 2", "capability = 9, at_least = 2");
        assert!(matches!(
            SyncConfig::from_toml(&unknown).unwrap_err(),
            Error::Config(ConfigError::UnknownCapability { capability: CapabilityId(9), .. })
        ));
        let zero = text.replace("at_least = 2", "at_least = 0");
        assert!(matches!(
            SyncConfig::from_toml(&zero).unwrap_err(),
            Error::Config(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_window_field_overflow_rejected() {
        assert!(validate_window("status", 8, 6, 2).is_ok());
        assert!(matches!(
            validate_window("status", 8, 7, 2),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            validate_window("status", 8, usize::MAX, 2),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_goal_weight_rejected() {
        let text = TABLE.replace("{ capability = 5, count = 2 }", "{ capability = 5, count = 2, weight = 0 }");
        assert!(matches!(
            SyncConfig::from_toml(&text).unwrap_err(),
            Error::Config(ConfigError::Invalid(_))
        ));
    }
}
