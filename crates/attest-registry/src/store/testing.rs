//! Shared fixtures for store tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// A credential helper that keeps one JSON file per server URL in a `data`
/// directory next to itself.
const FAKE_HELPER: &str = r#"#!/bin/sh
dir="$(dirname "$0")/data"
mkdir -p "$dir"
case "$1" in
  get)
    read -r host
    if [ -f "$dir/$host" ]; then cat "$dir/$host"; else echo "credentials not found in native keychain"; exit 1; fi ;;
  store)
    payload=$(cat)
    host=$(echo "$payload" | sed -n 's/.*"ServerURL":"\([^"]*\)".*/\1/p')
    echo "$payload" > "$dir/$host" ;;
  erase)
    read -r host
    if [ -f "$dir/$host" ]; then rm "$dir/$host"; else echo "credentials not found in native keychain"; exit 1; fi ;;
  *)
    echo "unknown action" >&2; exit 2 ;;
esac
"#;

/// Installs the fake helper as `docker-credential-<name>` in `dir`.
pub(crate) fn install_helper(dir: &Path, name: &str) -> PathBuf {
    let program = dir.join(format!("docker-credential-{name}"));
    std::fs::write(&program, FAKE_HELPER).unwrap();
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
    program
}
