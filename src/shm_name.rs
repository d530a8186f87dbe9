// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Channel names and visibility scopes.
// Turns a user-facing `(name, scope)` pair into the name the platform sees:
// `Local\name` / `Global\name` for Win32 kernel objects, a scope-prefixed
// `/...` name for POSIX shared memory objects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Visibility domain of a channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Visible only to the creating login session (POSIX: the creating user).
    #[default]
    Local,
    /// Visible machine-wide. Creating global objects may need extra privilege.
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Scope::Local),
            "global" => Ok(Scope::Global),
            other => Err(format!("unknown scope `{other}` (expected `local` or `global`)")),
        }
    }
}

/// Check that `name` can be used as a channel name in every scope.
///
/// Win32 reserves `\` as the namespace separator and POSIX forbids `/` past
/// the leading one, so both are rejected here rather than per platform.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name.contains('\\') {
        return Err("name contains a backslash");
    }
    if name.contains('/') {
        return Err("name contains a slash");
    }
    if name.contains('\0') {
        return Err("name contains a NUL byte");
    }
    Ok(())
}

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Convert a 64-bit value to a fixed-width 16-char lowercase hex string.
fn to_hex(val: u64) -> [u8; 16] {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut buf = [0u8; 16];
    let mut v = val;
    for i in (0..16).rev() {
        buf[i] = DIGITS[(v & 0xf) as usize];
        v >>= 4;
    }
    buf
}

/// Maximum length for POSIX shm names. Set to 0 to disable truncation.
///
/// On macOS `PSHMNAMLEN` is 31. On Linux the limit is typically 255.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0; // 0 = no truncation

/// POSIX object name for `name` in `scope`, with `uid` standing in for the
/// login session of a `Local` channel.
///
/// `Local` becomes `/l<uid>_<name>`, `Global` becomes `/g_<name>`. Names whose
/// POSIX form would exceed `SHM_NAME_MAX` are shortened to
/// `/<prefix>_<16-hex-FNV-1a-hash>`.
pub fn posix_name(name: &str, scope: Scope, uid: u32) -> String {
    let result = match scope {
        Scope::Local => format!("/l{uid}_{name}"),
        Scope::Global => format!("/g_{name}"),
    };
    shorten(result, SHM_NAME_MAX)
}

fn shorten(result: String, max: usize) -> String {
    if max == 0 || result.len() <= max {
        return result;
    }

    // 1 (underscore) + 16 (hex hash)
    const HASH_SUFFIX_LEN: usize = 1 + 16;
    let prefix_len = if max > HASH_SUFFIX_LEN + 1 {
        max - HASH_SUFFIX_LEN - 1 // -1 for leading '/'
    } else {
        0
    };

    let hex = to_hex(fnv1a_64(result.as_bytes()));

    let mut shortened = String::with_capacity(max);
    shortened.push('/');
    if prefix_len > 0 {
        let body = &result[1..];
        let mut take = prefix_len.min(body.len());
        while !body.is_char_boundary(take) {
            take -= 1;
        }
        shortened.push_str(&body[..take]);
    }
    shortened.push('_');
    shortened.extend(hex.iter().map(|&b| b as char));
    shortened
}

/// POSIX object name for the calling user.
#[cfg(unix)]
pub fn make_shm_name(name: &str, scope: Scope) -> String {
    let uid = unsafe { libc::getuid() };
    posix_name(name, scope, uid as u32)
}

/// Win32 kernel object name: `Local\<name>` or `Global\<name>`.
pub fn win32_name(name: &str, scope: Scope) -> String {
    match scope {
        Scope::Local => format!("Local\\{name}"),
        Scope::Global => format!("Global\\{name}"),
    }
}

/// The name handed to the platform layer for `name` in `scope`.
pub fn platform_name(name: &str, scope: Scope) -> String {
    #[cfg(unix)]
    {
        make_shm_name(name, scope)
    }
    #[cfg(windows)]
    {
        win32_name(name, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_values() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn to_hex_roundtrip() {
        let hex = to_hex(0x0123456789abcdef);
        assert_eq!(&hex, b"0123456789abcdef");
    }

    #[test]
    fn posix_names_keep_scopes_apart() {
        assert_eq!(shorten(posix_name("SampleMap", Scope::Local, 1000), 0), "/l1000_SampleMap");
        assert_eq!(shorten(posix_name("SampleMap", Scope::Global, 1000), 0), "/g_SampleMap");
        assert_ne!(posix_name("x", Scope::Local, 0), posix_name("x", Scope::Global, 0));
    }

    #[test]
    fn long_names_are_shortened_with_hash() {
        let long = format!("/g_{}", "n".repeat(64));
        let short = shorten(long.clone(), 31);
        assert_eq!(short.len(), 31);
        assert!(short.starts_with(&format!("/g_{}_", "n".repeat(11))));
        assert!(short.ends_with(std::str::from_utf8(&to_hex(fnv1a_64(long.as_bytes()))).unwrap()));
    }

    #[test]
    fn win32_names_use_namespace_prefix() {
        assert_eq!(win32_name("SampleMap", Scope::Local), "Local\\SampleMap");
        assert_eq!(win32_name("SampleMap", Scope::Global), "Global\\SampleMap");
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(validate_name("").is_err());
        assert!(validate_name("Global\\x").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("nul\0").is_err());
        assert!(validate_name("SampleMap").is_ok());
    }

    #[test]
    fn scope_parses_case_insensitively() {
        assert_eq!("Local".parse::<Scope>().unwrap(), Scope::Local);
        assert_eq!("GLOBAL".parse::<Scope>().unwrap(), Scope::Global);
        assert!("session".parse::<Scope>().is_err());
    }
}
