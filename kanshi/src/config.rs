//! In-memory representation of profiles, outputs, and hook commands (C1).

use std::fmt;

/// One (width, height, refresh) triple a profile-output may request.
///
/// Refresh is stored as millihertz, matching the wire representation and
/// [`crate::parser`]'s `round(v*1000)` conversion from the `@<Hz>` syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSpec {
    pub width: i32,
    pub height: i32,
    /// Millihertz; 0 means "unspecified, pick the highest refresh at this size".
    pub refresh: i32,
}

impl fmt::Display for ModeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.refresh == 0 {
            write!(f, "{}x{}", self.width, self.height)
        } else {
            write!(f, "{}x{}@{}Hz", self.width, self.height, self.refresh as f64 / 1000.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Output transform, matching `wl_output.transform` plus the wlr flipped variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

impl Transform {
    pub fn parse(s: &str) -> Option<Transform> {
        Some(match s {
            "normal" => Transform::Normal,
            "90" => Transform::Rotate90,
            "180" => Transform::Rotate180,
            "270" => Transform::Rotate270,
            "flipped" => Transform::Flipped,
            "flipped-90" => Transform::Flipped90,
            "flipped-180" => Transform::Flipped180,
            "flipped-270" => Transform::Flipped270,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transform::Normal => "normal",
            Transform::Rotate90 => "90",
            Transform::Rotate180 => "180",
            Transform::Rotate270 => "270",
            Transform::Flipped => "flipped",
            Transform::Flipped90 => "flipped-90",
            Transform::Flipped180 => "flipped-180",
            Transform::Flipped270 => "flipped-270",
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which fields a [`ProfileOutput`] set explicitly, per §4.1/Testable Property 4.
///
/// A per-field `Option` already carries this information; this is the
/// derived bitmask view used for testing and for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldMask {
    pub enabled: bool,
    pub mode: bool,
    pub position: bool,
    pub scale: bool,
    pub transform: bool,
}

/// One entry within a profile: a matcher plus the desired attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileOutput {
    /// Exact head name, substring-of-description (if it contains a space), or `"*"`.
    pub name: String,
    pub enabled: Option<bool>,
    pub mode: Option<ModeSpec>,
    pub position: Option<Position>,
    pub scale: Option<f64>,
    pub transform: Option<Transform>,
}

/// Whether `needle`'s whitespace-separated words occur, in order, among
/// `haystack`'s words (not necessarily contiguous) — e.g. `"Dell U2720"`
/// matches a description of `"Dell Inc. U2720 0x123"`. This is the
/// multi-word reading of §4.3's "appears as a substring of head
/// description"; the compositor-reported description usually interleaves
/// vendor boilerplate between the words a user would actually type.
fn words_in_order(needle: &str, haystack: &str) -> bool {
    let mut haystack_words = haystack.split_whitespace();
    needle
        .split_whitespace()
        .all(|word| haystack_words.any(|candidate| candidate == word))
}

impl ProfileOutput {
    pub fn new(name: impl Into<String>) -> Self {
        ProfileOutput {
            name: name.into(),
            enabled: None,
            mode: None,
            position: None,
            scale: None,
            transform: None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }

    /// Whether `self` can stand for `head_name`/`head_description`.
    ///
    /// Per spec §4.3: exact name match, wildcard, or (if the configured
    /// name contains a space) substring-of-description match.
    pub fn matches(&self, head_name: &str, head_description: &str) -> bool {
        if self.is_wildcard() {
            return true;
        }
        if self.name.contains(' ') {
            words_in_order(self.name.as_str(), head_description)
        } else {
            self.name == head_name
        }
    }

    pub fn fields_present(&self) -> FieldMask {
        FieldMask {
            enabled: self.enabled.is_some(),
            mode: self.mode.is_some(),
            position: self.position.is_some(),
            scale: self.scale.is_some(),
            transform: self.transform.is_some(),
        }
    }
}

impl fmt::Display for ProfileOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\toutput {:?}", self.name)?;
        match self.enabled {
            Some(true) => write!(f, " enable")?,
            Some(false) => write!(f, " disable")?,
            None => {}
        }
        if let Some(mode) = &self.mode {
            write!(f, " mode {}", mode)?;
        }
        if let Some(pos) = &self.position {
            write!(f, " position {}", pos)?;
        }
        if let Some(scale) = self.scale {
            write!(f, " scale {}", scale)?;
        }
        if let Some(transform) = &self.transform {
            write!(f, " transform {}", transform)?;
        }
        writeln!(f)
    }
}

/// A named, declarative target configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    /// Non-wildcard entries strictly precede wildcard entries (Testable Property 1).
    pub outputs: Vec<ProfileOutput>,
    pub exec: Vec<String>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Profile {
            name: name.into(),
            outputs: Vec::new(),
            exec: Vec::new(),
        }
    }

    pub fn anonymous_name(line: usize, column: usize) -> String {
        format!("<anonymous at line {line}, col {column}>")
    }

    /// Insert a parsed profile-output, preserving the wildcards-last invariant.
    pub fn insert_output(&mut self, output: ProfileOutput) {
        if output.is_wildcard() {
            self.outputs.push(output);
        } else {
            let split = self
                .outputs
                .iter()
                .position(|o| o.is_wildcard())
                .unwrap_or(self.outputs.len());
            self.outputs.insert(split, output);
        }
    }

    /// Checks invariant 1: every wildcard output's index exceeds every
    /// non-wildcard's index.
    pub fn wildcards_last(&self) -> bool {
        let mut seen_wildcard = false;
        for output in &self.outputs {
            if output.is_wildcard() {
                seen_wildcard = true;
            } else if seen_wildcard {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "profile {:?} {{", self.name)?;
        for output in &self.outputs {
            write!(f, "{}", output)?;
        }
        for cmd in &self.exec {
            writeln!(f, "\texec {}", cmd)?;
        }
        writeln!(f, "}}")
    }
}

/// An ordered sequence of profiles; declaration order is matching order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub profiles: Vec<Profile>,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn append(&mut self, other: Config) {
        self.profiles.extend(other.profiles);
    }

    /// Structural equivalence used by Testable Property 6 (parse →
    /// serialize → reparse). Ignores nothing: auto-generated anonymous
    /// names are themselves part of the model, so two configs are
    /// equivalent exactly when [`PartialEq`] says so; this method exists
    /// as the named entry point the property test documents against.
    pub fn equivalent(&self, other: &Config) -> bool {
        self == other
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, profile) in self.profiles.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", profile)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_inserted_after_specific() {
        let mut profile = Profile::new("test");
        profile.insert_output(ProfileOutput::new("*"));
        profile.insert_output(ProfileOutput::new("DP-1"));
        profile.insert_output(ProfileOutput::new("eDP-1"));
        assert!(profile.wildcards_last());
        assert_eq!(profile.outputs[0].name, "DP-1");
        assert_eq!(profile.outputs[1].name, "eDP-1");
        assert_eq!(profile.outputs[2].name, "*");
    }

    #[test]
    fn matches_exact_name() {
        let output = ProfileOutput::new("DP-1");
        assert!(output.matches("DP-1", "Dell U2720"));
        assert!(!output.matches("DP-2", "Dell U2720"));
    }

    #[test]
    fn matches_description_substring_requires_space() {
        let output = ProfileOutput::new("Dell U2720");
        assert!(output.matches("DP-1", "Dell Inc. U2720 0x123"));

        let single_word = ProfileOutput::new("Dell");
        assert!(!single_word.matches("DP-1", "Dell Inc. U2720"));
    }

    #[test]
    fn wildcard_matches_anything() {
        let output = ProfileOutput::new("*");
        assert!(output.matches("whatever", "anything"));
    }

    #[test]
    fn fields_present_mask_reflects_set_fields() {
        let mut output = ProfileOutput::new("DP-1");
        output.enabled = Some(true);
        output.scale = Some(1.5);
        let mask = output.fields_present();
        assert!(mask.enabled);
        assert!(mask.scale);
        assert!(!mask.mode);
        assert!(!mask.position);
        assert!(!mask.transform);
    }
}
