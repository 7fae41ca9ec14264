// ─── Placeholder Substitution ───
// `${name}` tokens in resolved arguments are replaced in one left-to-right
// pass. Substituted text is never rescanned, and a name with no value
// becomes the empty string.

use std::collections::HashMap;

use tracing::debug;

pub const LAUNCHER_NAME: &str = "InterfaceLauncher";
pub const LAUNCHER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Every placeholder the assembler knows how to fill.
pub const KNOWN_PLACEHOLDERS: &[&str] = &[
    "auth_player_name",
    "auth_uuid",
    "auth_access_token",
    "auth_session",
    "auth_xuid",
    "clientid",
    "user_type",
    "user_properties",
    "version_name",
    "version_type",
    "game_directory",
    "assets_root",
    "game_assets",
    "assets_index_name",
    "classpath",
    "classpath_separator",
    "natives_directory",
    "library_directory",
    "launcher_name",
    "launcher_version",
    "resolution_width",
    "resolution_height",
    "min_memory",
    "max_memory",
];

#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    values: HashMap<String, String>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn apply(&self, arg: &str) -> String {
        let mut out = String::with_capacity(arg.len());
        let mut rest = arg;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                // Unterminated: keep the remainder verbatim.
                out.push_str(&rest[start..]);
                return out;
            };
            let name = &after[..end];
            match self.values.get(name) {
                Some(value) => out.push_str(value),
                None => debug!("No value for placeholder ${{{}}}", name),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }

    pub fn apply_all(&self, args: &[String]) -> Vec<String> {
        args.iter().map(|a| self.apply(a)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Substitutions {
        let mut s = Substitutions::new();
        s.set("auth_player_name", "Steve")
            .set("game_directory", "/games/main")
            .set("classpath", "${natives_directory}");
        s
    }

    #[test]
    fn replaces_known_and_blanks_unknown() {
        let s = vars();
        assert_eq!(s.apply("--username"), "--username");
        assert_eq!(s.apply("${auth_player_name}"), "Steve");
        assert_eq!(s.apply("-Ddir=${game_directory}/logs"), "-Ddir=/games/main/logs");
        assert_eq!(s.apply("${no_such_thing}"), "");
        assert_eq!(s.apply("a${no_such_thing}b"), "ab");
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        assert_eq!(vars().apply("${classpath}"), "${natives_directory}");
    }

    #[test]
    fn unterminated_placeholder_is_left_alone() {
        assert_eq!(vars().apply("x${auth_player_name"), "x${auth_player_name");
    }

    #[test]
    fn several_in_one_argument() {
        assert_eq!(
            vars().apply("${auth_player_name}@${game_directory}"),
            "Steve@/games/main"
        );
    }
}
