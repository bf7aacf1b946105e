use crate::error::BuildError;
use crate::types::SfxModule;

/// The two default exclusions 7-Zip always receives, ahead of any
/// per-job exclusion the operator configured.
const GLOBAL_DEFAULT_EXCLUSIONS: [&str; 2] = ["-x!$RECYCLE.BIN", "-x!System Volume Information"];

const EXCLUSION_PREFIXES: [&str; 4] = ["-x!", "-xr!", "-i!", "-ir!"];

/// Pre-normalized inputs to the archive builder. Every field here is
/// already a 7-Zip switch token (or the raw value it wraps) — the
/// compression-level-name-to-switch mapping, date formatting, and the
/// like are `EffectiveConfigResolver`'s job, not this one's.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuildOptions {
    pub archive_type_switch: String,
    pub compression_level_switch: Option<String>,
    pub compression_method_switch: Option<String>,
    pub dictionary_size_switch: Option<String>,
    pub word_size_switch: Option<String>,
    pub solid_block_size_switch: Option<String>,
    pub compress_open_files: bool,
    pub threads_switch: Option<String>,
    pub create_sfx: bool,
    pub sfx_module: SfxModule,
    /// Job-level exclusion tokens in configured order, not yet prefixed.
    pub additional_exclusions: Vec<String>,
    pub password_in_use: bool,
    pub password_file: Option<String>,
    pub archive_path: String,
    pub source_paths: Vec<String>,
}

/// Prefixes an exclusion token with `-x!` unless it already carries one
/// of the four recognised exclusion-switch prefixes.
pub fn prefix_exclusion(token: &str) -> String {
    if EXCLUSION_PREFIXES.iter().any(|p| token.starts_with(p)) {
        token.to_string()
    } else {
        format!("-x!{token}")
    }
}

/// Assembles the ordered 7-Zip argument token sequence from already
/// resolved options. The order is fixed and load-bearing: archive-type
/// switch, compression switches, `-ssw`, threads, SFX, global
/// exclusions, job exclusions, header encryption, password-file switch,
/// archive path, then source paths.
pub fn build_args(opts: &ArchiveBuildOptions) -> Result<Vec<String>, BuildError> {
    if opts.archive_path.trim().is_empty() {
        return Err(BuildError::EmptyArchivePath);
    }

    let mut tokens = Vec::with_capacity(16 + opts.source_paths.len());
    tokens.push("a".to_string());

    if !opts.archive_type_switch.is_empty() {
        tokens.push(opts.archive_type_switch.clone());
    }
    if let Some(t) = &opts.compression_level_switch {
        tokens.push(t.clone());
    }
    if let Some(t) = &opts.compression_method_switch {
        tokens.push(t.clone());
    }
    if let Some(t) = &opts.dictionary_size_switch {
        tokens.push(t.clone());
    }
    if let Some(t) = &opts.word_size_switch {
        tokens.push(t.clone());
    }
    if let Some(t) = &opts.solid_block_size_switch {
        tokens.push(t.clone());
    }
    if opts.compress_open_files {
        tokens.push("-ssw".to_string());
    }
    if let Some(t) = &opts.threads_switch {
        tokens.push(t.clone());
    }
    if opts.create_sfx {
        tokens.push(opts.sfx_module.token().to_string());
    }

    tokens.extend(GLOBAL_DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()));
    tokens.extend(opts.additional_exclusions.iter().map(|t| prefix_exclusion(t)));

    if opts.password_in_use {
        tokens.push("-mhe=on".to_string());
    }
    match (&opts.password_file, opts.password_in_use) {
        (Some(path), _) => tokens.push(format!("-spf\"{path}\"")),
        (None, true) => {
            tracing::warn!(
                "password-required job has no temp password file; omitting -spf so 7-Zip surfaces the missing-password error"
            );
        }
        (None, false) => {}
    }

    tokens.push(opts.archive_path.clone());
    tokens.extend(opts.source_paths.iter().cloned());

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_opts() -> ArchiveBuildOptions {
        ArchiveBuildOptions {
            archive_type_switch: "-t7z".to_string(),
            archive_path: "C:\\Staging\\DataBackup-2026-07-27.7z".to_string(),
            source_paths: vec!["C:\\Data".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn empty_archive_path_is_build_error() {
        let mut opts = base_opts();
        opts.archive_path = "  ".to_string();
        assert!(matches!(build_args(&opts), Err(BuildError::EmptyArchivePath)));
    }

    #[test]
    fn ordering_matches_fixed_sequence() {
        let mut opts = base_opts();
        opts.compression_level_switch = Some("-mx=9".to_string());
        opts.compress_open_files = true;
        opts.threads_switch = Some("-mmt=4".to_string());
        opts.create_sfx = true;
        opts.sfx_module = SfxModule::Installer;
        opts.additional_exclusions = vec!["*.tmp".to_string(), "-xr!node_modules".to_string()];
        opts.password_in_use = true;
        opts.password_file = Some("C:\\Temp\\pw.txt".to_string());

        let tokens = build_args(&opts).unwrap();
        assert_eq!(
            tokens,
            vec![
                "a",
                "-t7z",
                "-mx=9",
                "-ssw",
                "-mmt=4",
                "-sfx7zSD.sfx",
                "-x!$RECYCLE.BIN",
                "-x!System Volume Information",
                "-x!*.tmp",
                "-xr!node_modules",
                "-mhe=on",
                "-spf\"C:\\Temp\\pw.txt\"",
                "C:\\Staging\\DataBackup-2026-07-27.7z",
                "C:\\Data",
            ]
        );
    }

    #[test]
    fn unrelated_mutation_does_not_perturb_ordering() {
        let mut opts_a = base_opts();
        opts_a.compression_level_switch = Some("-mx=5".to_string());
        let mut opts_b = opts_a.clone();
        opts_b.dictionary_size_switch = Some("-md=32m".to_string());

        let before = build_args(&opts_a).unwrap();
        let after = build_args(&opts_b).unwrap();
        // every token in `before` still appears in the same relative order in `after`
        let mut cursor = 0;
        for tok in &before {
            let pos = after[cursor..].iter().position(|t| t == tok).unwrap();
            cursor += pos + 1;
        }
    }

    #[test]
    fn password_required_without_file_omits_spf_but_warns() {
        let mut opts = base_opts();
        opts.password_in_use = true;
        opts.password_file = None;
        let tokens = build_args(&opts).unwrap();
        assert!(tokens.iter().any(|t| t == "-mhe=on"));
        assert!(!tokens.iter().any(|t| t.starts_with("-spf")));
    }

    #[test]
    fn every_exclusion_without_recognised_prefix_gets_x_bang() {
        for raw in ["foo.bak", "-x!already", "-xr!already", "-i!already", "-ir!already"] {
            let prefixed = prefix_exclusion(raw);
            if EXCLUSION_PREFIXES.iter().any(|p| raw.starts_with(p)) {
                assert_eq!(prefixed, raw);
            } else {
                assert_eq!(prefixed, format!("-x!{raw}"));
            }
        }
    }
}
