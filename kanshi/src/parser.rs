//! The block-structured config DSL (C2). Grammar and semantics: spec.md §4.1.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Config, ModeSpec, Position, Profile, ProfileOutput, Transform};
use crate::error::ConfigError;

const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    LBrace,
    RBrace,
    Newline,
    Str(String),
    Eof,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    path: PathBuf,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    fn new(path: PathBuf, src: &'a str) -> Self {
        Lexer {
            chars: src.chars().peekable(),
            path,
            line: 1,
            col: 0,
        }
    }

    fn err(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Syntax {
            path: self.path.clone(),
            line: self.line,
            column: self.col,
            message: message.into(),
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn ignore_line(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.read_char();
        }
    }

    /// Reads the raw remainder of the current line, used by `include` and
    /// `exec` (spec.md: "LINE-REST"). Does not interpret quotes.
    fn read_line_rest(&mut self) -> String {
        let mut s = String::new();
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            s.push(self.read_char().unwrap());
        }
        s.trim().to_string()
    }

    fn read_quoted(&mut self) -> Result<String, ConfigError> {
        let mut s = String::new();
        loop {
            match self.read_char() {
                None => return Err(self.err("unterminated quoted string")),
                Some('"') => return Ok(s),
                Some(ch) => s.push(ch),
            }
        }
    }

    fn read_bare(&mut self, first: char) -> String {
        let mut s = String::new();
        s.push(first);
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || ch == '{' || ch == '}' {
                break;
            }
            s.push(self.read_char().unwrap());
        }
        s
    }

    fn next_token(&mut self) -> Result<TokenKind, ConfigError> {
        loop {
            let ch = match self.read_char() {
                Some(ch) => ch,
                None => return Ok(TokenKind::Eof),
            };

            if ch == '{' {
                return Ok(TokenKind::LBrace);
            } else if ch == '}' {
                return Ok(TokenKind::RBrace);
            } else if ch == '\n' {
                return Ok(TokenKind::Newline);
            } else if ch == '#' {
                self.ignore_line();
                return Ok(TokenKind::Newline);
            } else if ch.is_whitespace() {
                continue;
            } else if ch == '"' {
                return Ok(TokenKind::Str(self.read_quoted()?));
            } else {
                return Ok(TokenKind::Str(self.read_bare(ch)));
            }
        }
    }
}

fn parse_int(s: &str) -> Option<i32> {
    if s.is_empty() {
        return None;
    }
    s.parse().ok()
}

fn parse_mode(s: &str) -> Option<ModeSpec> {
    let (dims, refresh) = match s.split_once('@') {
        Some((dims, refresh)) => (dims, Some(refresh)),
        None => (s, None),
    };
    let (width, height) = dims.split_once('x')?;
    let width = parse_int(width)?;
    let height = parse_int(height)?;
    let refresh = match refresh {
        None => 0,
        Some(r) => {
            let r = r.strip_suffix("Hz").unwrap_or(r);
            let hz: f64 = r.parse().ok()?;
            (hz * 1000.0).round() as i32
        }
    };
    Some(ModeSpec {
        width,
        height,
        refresh,
    })
}

fn parse_position(s: &str) -> Option<Position> {
    let (x, y) = s.split_once(',')?;
    Some(Position {
        x: parse_int(x)?,
        y: parse_int(y)?,
    })
}

struct Parser<'a> {
    lexer: Lexer<'a>,
}

enum OutputKey {
    Mode,
    Position,
    Scale,
    Transform,
}

impl<'a> Parser<'a> {
    fn parse_profile_output(&mut self) -> Result<ProfileOutput, ConfigError> {
        let name = match self.lexer.next_token()? {
            TokenKind::Str(s) => s,
            other => return Err(self.lexer.err(format!("expected output name, got {:?}", other))),
        };
        let mut output = ProfileOutput::new(name);
        let mut pending_key: Option<OutputKey> = None;

        loop {
            match self.lexer.next_token()? {
                TokenKind::Str(value) => {
                    if let Some(key) = pending_key.take() {
                        match key {
                            OutputKey::Mode => {
                                output.mode = Some(parse_mode(&value).ok_or_else(|| {
                                    self.lexer.err(format!("invalid output mode: {value:?}"))
                                })?);
                            }
                            OutputKey::Position => {
                                output.position = Some(parse_position(&value).ok_or_else(|| {
                                    self.lexer.err(format!("invalid output position: {value:?}"))
                                })?);
                            }
                            OutputKey::Scale => {
                                let scale: f64 = value.parse().map_err(|_| {
                                    self.lexer.err(format!("invalid output scale: {value:?}"))
                                })?;
                                output.scale = Some(scale);
                            }
                            OutputKey::Transform => {
                                output.transform = Some(Transform::parse(&value).ok_or_else(|| {
                                    self.lexer.err(format!("invalid output transform: {value:?}"))
                                })?);
                            }
                        }
                    } else {
                        match value.as_str() {
                            "enable" => output.enabled = Some(true),
                            "disable" => output.enabled = Some(false),
                            "mode" => pending_key = Some(OutputKey::Mode),
                            "position" | "pos" => pending_key = Some(OutputKey::Position),
                            "scale" => pending_key = Some(OutputKey::Scale),
                            "transform" => pending_key = Some(OutputKey::Transform),
                            other => {
                                return Err(self
                                    .lexer
                                    .err(format!("unknown directive {other:?} in output")))
                            }
                        }
                    }
                }
                TokenKind::Newline => {
                    if pending_key.is_some() {
                        return Err(self.lexer.err("directive missing a value"));
                    }
                    return Ok(output);
                }
                other => return Err(self.lexer.err(format!("unexpected {:?} in output", other))),
            }
        }
    }

    fn parse_exec(&mut self) -> Result<String, ConfigError> {
        let command = self.lexer.read_line_rest();
        if command.is_empty() {
            return Err(self.lexer.err("empty exec command"));
        }
        Ok(command)
    }

    fn parse_profile(&mut self) -> Result<Profile, ConfigError> {
        let mut name = None;
        match self.lexer.next_token()? {
            TokenKind::LBrace => {}
            TokenKind::Str(s) => {
                name = Some(s);
                match self.lexer.next_token()? {
                    TokenKind::LBrace => {}
                    other => {
                        return Err(self
                            .lexer
                            .err(format!("expected '{{' after profile name, got {:?}", other)))
                    }
                }
            }
            other => {
                return Err(self
                    .lexer
                    .err(format!("expected '{{' or a profile name, got {:?}", other)))
            }
        }

        let name = name.unwrap_or_else(|| Profile::anonymous_name(self.lexer.line, self.lexer.col));
        let mut profile = Profile::new(name);

        loop {
            match self.lexer.next_token()? {
                TokenKind::RBrace => return Ok(profile),
                TokenKind::Newline => continue,
                TokenKind::Str(directive) => match directive.as_str() {
                    "output" => {
                        let output = self.parse_profile_output()?;
                        profile.insert_output(output);
                    }
                    "exec" => {
                        let command = self.parse_exec()?;
                        profile.exec.push(command);
                    }
                    other => {
                        return Err(self
                            .lexer
                            .err(format!("unknown directive {other:?} in profile")))
                    }
                },
                other => {
                    return Err(self
                        .lexer
                        .err(format!("unexpected {:?} in profile", other)))
                }
            }
        }
    }

    fn parse_include(&mut self, depth: usize) -> Result<Config, ConfigError> {
        let pattern = self.lexer.read_line_rest();
        if pattern.is_empty() {
            return Ok(Config::new());
        }
        if depth >= MAX_INCLUDE_DEPTH {
            return Err(ConfigError::IncludeDepth {
                limit: MAX_INCLUDE_DEPTH,
            });
        }

        let expansion = wordexp::wordexp(
            &pattern,
            wordexp::Wordexp::new(0),
            wordexp::WRDE_SHOWERR | wordexp::WRDE_UNDEF,
        )
        .map_err(|source| ConfigError::WordExpand {
            pattern: pattern.clone(),
            source,
        })?;

        let mut config = Config::new();
        for path in expansion {
            config.append(parse_file(Path::new(path), depth + 1)?);
        }
        Ok(config)
    }
}

fn parse_source(path: PathBuf, src: &str, depth: usize) -> Result<Config, ConfigError> {
    let mut parser = Parser {
        lexer: Lexer::new(path, src),
    };
    let mut config = Config::new();

    loop {
        match parser.lexer.next_token()? {
            TokenKind::Eof => return Ok(config),
            TokenKind::Newline => continue,
            TokenKind::LBrace => {
                // Legacy syntax: a profile body without a leading `profile` keyword.
                let profile = parse_profile_body_after_lbrace(&mut parser)?;
                config.profiles.push(profile);
            }
            TokenKind::Str(directive) => match directive.as_str() {
                "profile" => config.profiles.push(parser.parse_profile()?),
                "include" => config.append(parser.parse_include(depth)?),
                other => {
                    return Err(parser
                        .lexer
                        .err(format!("unknown directive {other:?}")))
                }
            },
            TokenKind::RBrace => {
                return Err(parser.lexer.err("unexpected '}'"));
            }
        }
    }
}

fn parse_profile_body_after_lbrace(parser: &mut Parser) -> Result<Profile, ConfigError> {
    let name = Profile::anonymous_name(parser.lexer.line, parser.lexer.col);
    let mut profile = Profile::new(name);
    loop {
        match parser.lexer.next_token()? {
            TokenKind::RBrace => return Ok(profile),
            TokenKind::Newline => continue,
            TokenKind::Str(directive) => match directive.as_str() {
                "output" => {
                    let output = parser.parse_profile_output()?;
                    profile.insert_output(output);
                }
                "exec" => {
                    let command = parser.parse_exec()?;
                    profile.exec.push(command);
                }
                other => {
                    return Err(parser
                        .lexer
                        .err(format!("unknown directive {other:?} in profile")))
                }
            },
            other => {
                return Err(parser
                    .lexer
                    .err(format!("unexpected {:?} in profile", other)))
            }
        }
    }
}

fn parse_file(path: &Path, depth: usize) -> Result<Config, ConfigError> {
    let src = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_source(path.to_path_buf(), &src, depth)
}

/// Parses a config file from disk, following `include` directives.
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    parse_file(path, 0)
}

/// Parses config text directly, as if it were `path` — used by tests and by
/// `kanshictl dump`'s round-trip check (Testable Property 6).
pub fn parse_str(path: &Path, src: &str) -> Result<Config, ConfigError> {
    parse_source(path.to_path_buf(), src, 0)
}

/// Locates the config file per spec.md §6: `$XDG_CONFIG_HOME/kanshi/config`
/// if set, else `$HOME/.config/kanshi/config`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg).join("kanshi").join("config"));
        }
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
    if home.is_empty() {
        return Err(ConfigError::NoHome);
    }
    Ok(PathBuf::from(home).join(".config").join("kanshi").join("config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Config {
        parse_str(Path::new("<test>"), src).expect("parse should succeed")
    }

    #[test]
    fn empty_config_has_no_profiles() {
        let config = parse("");
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn s1_exact_match_profile() {
        let config = parse(
            r#"
            profile laptop {
                output eDP-1 mode 1920x1080 position 0,0
                output DP-1 mode 2560x1440@60Hz position 1920,0
            }
            "#,
        );
        assert_eq!(config.profiles.len(), 1);
        let profile = &config.profiles[0];
        assert_eq!(profile.name, "laptop");
        assert_eq!(profile.outputs.len(), 2);
        assert_eq!(
            profile.outputs[0].mode,
            Some(ModeSpec {
                width: 1920,
                height: 1080,
                refresh: 0
            })
        );
        assert_eq!(
            profile.outputs[1].mode,
            Some(ModeSpec {
                width: 2560,
                height: 1440,
                refresh: 60_000
            })
        );
    }

    #[test]
    fn wildcard_profile_output_matches_any() {
        let config = parse("profile any {\n    output \"*\" enable\n}\n");
        assert!(config.profiles[0].outputs[0].is_wildcard());
    }

    #[test]
    fn anonymous_profile_gets_position_based_name() {
        let config = parse("profile {\n  output \"*\" enable\n}\n");
        assert!(config.profiles[0].name.starts_with("<anonymous at line"));
    }

    #[test]
    fn comment_is_ignored() {
        let config = parse("# a comment\nprofile x {\n  # inner comment\n  output \"*\" enable\n}\n");
        assert_eq!(config.profiles.len(), 1);
    }

    #[test]
    fn quoted_string_with_space_used_as_description_match() {
        let config = parse("profile d {\n    output \"Dell U2720\" mode 2560x1440\n}\n");
        assert_eq!(config.profiles[0].outputs[0].name, "Dell U2720");
    }

    #[test]
    fn exec_command_is_captured_literally() {
        let config = parse("profile x {\n  exec notify-send \"hi there\" --urgency=low\n}\n");
        assert_eq!(
            config.profiles[0].exec[0],
            "notify-send \"hi there\" --urgency=low"
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let result = parse_str(Path::new("<test>"), "profile x {\n output \"oops\n}\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_directive_is_an_error() {
        let result = parse_str(Path::new("<test>"), "bogus\n");
        assert!(result.is_err());
    }

    #[test]
    fn include_directive_reads_and_appends_another_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let included_path = dir.path().join("laptop.conf");
        fs::write(
            &included_path,
            "profile laptop {\n    output eDP-1 mode 1920x1080\n}\n",
        )
        .expect("write included file");

        let main_path = dir.path().join("config");
        fs::write(&main_path, format!("include {}\n", included_path.display()))
            .expect("write main config");

        let config = parse_config(&main_path).expect("parse should succeed");
        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.profiles[0].name, "laptop");
    }

    #[test]
    fn missing_included_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let main_path = dir.path().join("config");
        fs::write(&main_path, format!("include {}\n", dir.path().join("nope.conf").display()))
            .expect("write main config");

        assert!(parse_config(&main_path).is_err());
    }

    #[test]
    fn round_trip_preserves_model() {
        let config = parse(
            r#"
            profile laptop {
                output eDP-1 mode 1920x1080 position 0,0 scale 1.5 transform 90
                output "*" disable
            }
            "#,
        );
        let rendered = config.to_string();
        let reparsed = parse_str(Path::new("<test>"), &rendered).expect("reparse should succeed");
        assert!(config.equivalent(&reparsed));
    }
}
