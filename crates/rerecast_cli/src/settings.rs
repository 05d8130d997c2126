//! The `key=value` settings file that overrides the default build parameters.

use std::{fs, io, path::Path, str::FromStr};

use rerecast::{NavmeshConfigBuilder, PartitionType};
use tracing::{debug, warn};

/// Build parameters read from a settings file.
///
/// Every field is `None` unless the file sets it, so applying the settings
/// only overrides what the user asked for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSettings {
    pub cell_size: Option<f32>,
    pub cell_height: Option<f32>,
    pub agent_height: Option<f32>,
    pub agent_radius: Option<f32>,
    pub agent_max_climb: Option<f32>,
    /// In degrees.
    pub agent_max_slope: Option<f32>,
    pub region_min_size: Option<f32>,
    pub region_merge_size: Option<f32>,
    pub edge_max_len: Option<f32>,
    pub edge_max_error: Option<f32>,
    pub verts_per_poly: Option<f32>,
    pub detail_sample_dist: Option<f32>,
    pub detail_sample_max_error: Option<f32>,
    pub partition_type: Option<PartitionType>,
    /// Selects the tiled builder instead of the solo one.
    pub tiled: Option<bool>,
    /// In cells.
    pub tile_size: Option<f32>,
}

impl BuildSettings {
    /// Reads and parses a settings file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parses settings text. Malformed lines, unknown keys and bad values are skipped.
    pub fn parse(text: &str) -> Self {
        let mut settings = Self::default();
        for (index, line) in text.lines().enumerate() {
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                continue;
            }
            settings.set(key, value, index + 1);
        }
        settings
    }

    fn set(&mut self, key: &str, value: &str, line: usize) {
        let parsed = match key {
            "cellSize" => parse_checked(&mut self.cell_size, value, is_positive),
            "cellHeight" => parse_checked(&mut self.cell_height, value, is_positive),
            "agentHeight" => parse_into(&mut self.agent_height, value),
            "agentRadius" => parse_into(&mut self.agent_radius, value),
            "agentMaxClimb" => parse_into(&mut self.agent_max_climb, value),
            "agentMaxSlope" => parse_into(&mut self.agent_max_slope, value),
            "regionMinSize" => parse_into(&mut self.region_min_size, value),
            "regionMergeSize" => parse_into(&mut self.region_merge_size, value),
            "edgeMaxLen" => parse_into(&mut self.edge_max_len, value),
            "edgeMaxError" => parse_into(&mut self.edge_max_error, value),
            "vertsPerPoly" => parse_into(&mut self.verts_per_poly, value),
            "detailSampleDist" => parse_into(&mut self.detail_sample_dist, value),
            "detailSampleMaxError" => parse_into(&mut self.detail_sample_max_error, value),
            "tileSize" => parse_checked(&mut self.tile_size, value, |size| {
                (1.0..=u16::MAX as f32).contains(size)
            }),
            "partitionType" => {
                let partition_type = value
                    .parse::<i32>()
                    .ok()
                    .and_then(|value| PartitionType::try_from(value).ok());
                partition_type
                    .map(|partition_type| self.partition_type = Some(partition_type))
                    .is_some()
            }
            "tiled" => {
                let tiled = match value {
                    "1" | "true" => Some(true),
                    "0" | "false" => Some(false),
                    _ => None,
                };
                tiled.map(|tiled| self.tiled = Some(tiled)).is_some()
            }
            _ => {
                debug!("Ignoring unknown setting `{key}` on line {line}");
                return;
            }
        };
        if !parsed {
            warn!("Ignoring invalid value `{value}` for setting `{key}` on line {line}");
        }
    }

    /// Whether the tiled builder was requested.
    pub fn is_tiled(&self) -> bool {
        self.tiled.unwrap_or(false)
    }

    /// Overrides the parameters of `config` with every setting that is present.
    pub fn apply_to(&self, config: &mut NavmeshConfigBuilder) {
        let overrides = [
            (self.cell_size, &mut config.cell_size),
            (self.cell_height, &mut config.cell_height),
            (self.agent_height, &mut config.agent_height),
            (self.agent_radius, &mut config.agent_radius),
            (self.agent_max_climb, &mut config.agent_max_climb),
            (self.region_min_size, &mut config.region_min_size),
            (self.region_merge_size, &mut config.region_merge_size),
            (self.edge_max_len, &mut config.edge_max_len),
            (self.edge_max_error, &mut config.edge_max_error),
            (self.verts_per_poly, &mut config.verts_per_poly),
            (self.detail_sample_dist, &mut config.detail_sample_dist),
            (self.detail_sample_max_error, &mut config.detail_sample_max_error),
        ];
        for (value, field) in overrides {
            if let Some(value) = value {
                *field = value;
            }
        }
        if let Some(degrees) = self.agent_max_slope {
            config.agent_max_slope = degrees.to_radians();
        }
        if let Some(partition_type) = self.partition_type {
            config.partition_type = partition_type;
        }
        if let Some(tile_size) = self.tile_size {
            config.tile_size = tile_size as u16;
        }
    }
}

/// Stores the parsed `value` in `field`. Returns `false` and leaves `field` alone if parsing fails.
fn parse_into<T: FromStr>(field: &mut Option<T>, value: &str) -> bool {
    parse_checked(field, value, |_| true)
}

/// Like [`parse_into`], but also rejects values for which `accept` returns `false`.
fn parse_checked<T: FromStr>(
    field: &mut Option<T>,
    value: &str,
    accept: impl Fn(&T) -> bool,
) -> bool {
    match value.parse() {
        Ok(value) if accept(&value) => {
            *field = Some(value);
            true
        }
        _ => false,
    }
}

fn is_positive(value: &f32) -> bool {
    *value > 0.0 && value.is_finite()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn comment_lines_are_ignored() {
        let settings = BuildSettings::parse("#cellSize=0.5\ncellHeight=0.1\n");
        assert_eq!(settings.cell_size, None);
        assert_eq!(settings.cell_height, Some(0.1));
    }

    #[test]
    fn keys_and_values_are_trimmed() {
        let settings = BuildSettings::parse("  agentRadius \t=  0.4  \r\n");
        assert_eq!(settings.agent_radius, Some(0.4));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let settings = BuildSettings::parse("cellSize\n=0.5\ncellHeight=\n\nagentHeight=1.5");
        assert_eq!(
            settings,
            BuildSettings {
                agent_height: Some(1.5),
                ..Default::default()
            }
        );
    }

    #[test]
    fn later_values_win() {
        let settings = BuildSettings::parse("edgeMaxLen=10\nedgeMaxLen=20\n");
        assert_eq!(settings.edge_max_len, Some(20.0));
    }

    #[test]
    fn missing_keys_keep_defaults() {
        let mut config = NavmeshConfigBuilder::default();
        BuildSettings::parse("cellSize=0.25").apply_to(&mut config);
        assert_eq!(
            config,
            NavmeshConfigBuilder {
                cell_size: 0.25,
                ..Default::default()
            }
        );
    }

    #[test]
    fn unknown_keys_and_bad_values_are_ignored() {
        let settings = BuildSettings::parse("favoriteColor=blue\ncellSize=wide\npartitionType=7");
        assert_eq!(settings, BuildSettings::default());
    }

    #[test]
    fn out_of_range_sizes_are_ignored() {
        let settings = BuildSettings::parse(
            "cellSize=0\ncellHeight=-0.2\ntileSize=70000\ntileSize=0\ncellSize=NaN\n",
        );
        assert_eq!(settings, BuildSettings::default());

        let settings = BuildSettings::parse("cellSize=0.1\ntileSize=65535\n");
        assert_eq!(settings.cell_size, Some(0.1));
        assert_eq!(settings.tile_size, Some(65535.0));
    }

    #[test]
    fn slope_is_given_in_degrees() {
        let mut config = NavmeshConfigBuilder::default();
        BuildSettings::parse("agentMaxSlope=30").apply_to(&mut config);
        assert_relative_eq!(config.agent_max_slope, 30.0_f32.to_radians());
    }

    #[test]
    fn partition_and_tiling() {
        let settings = BuildSettings::parse("partitionType=1\ntiled=true\ntileSize=48");
        assert!(settings.is_tiled());
        let mut config = NavmeshConfigBuilder::default();
        settings.apply_to(&mut config);
        assert_eq!(config.partition_type, PartitionType::Monotone);
        assert_eq!(config.tile_size, 48);

        assert!(!BuildSettings::parse("tiled=0").is_tiled());
        assert!(BuildSettings::parse("tiled=1").is_tiled());
        assert!(!BuildSettings::default().is_tiled());
    }
}
