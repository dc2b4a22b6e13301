//! Package extraction from install command lines.

use tollgate_core::traits::{Ecosystem, PackageRef};

const SEPARATORS: &[&str] = &["&&", "||", ";", "|", "&"];

/// Flags whose next token is a value, not a package.
const VALUE_FLAGS: &[&str] = &[
    "-r",
    "--requirement",
    "-c",
    "--constraint",
    "-e",
    "--editable",
    "-i",
    "--index-url",
    "--extra-index-url",
    "--registry",
    "--prefix",
    "-t",
    "--target",
    "--features",
    "-F",
    "--version",
    "--source",
    "--path",
    "--git",
    "--branch",
    "--tag",
    "--rev",
    "--group",
    "--workspace",
    "--filter",
];

/// Every package named by install commands in `command`, in order.
///
/// Tokenizes like a POSIX shell (without running one), splits on command
/// separators, and keeps version pins only when they are exact.
pub fn extract_packages(command: &str) -> Vec<PackageRef> {
    let tokens = shell_words::split(command)
        .unwrap_or_else(|_| command.split_whitespace().map(str::to_string).collect());

    let mut packages = Vec::new();
    for segment in segments(tokens) {
        let Some((ecosystem, args)) = installer(&segment) else {
            continue;
        };
        let mut skip_value = false;
        for arg in args {
            if skip_value {
                skip_value = false;
                continue;
            }
            if arg.starts_with('-') {
                skip_value = VALUE_FLAGS.contains(&arg.as_str());
                continue;
            }
            if !looks_like_package(arg) {
                continue;
            }
            if let Some(pkg) = parse_spec(ecosystem, arg) {
                packages.push(pkg);
            }
        }
    }
    packages
}

fn segments(tokens: Vec<String>) -> Vec<Vec<String>> {
    let mut out = vec![Vec::new()];
    for token in tokens {
        if SEPARATORS.contains(&token.as_str()) {
            out.push(Vec::new());
            continue;
        }
        // `a;` or `a&&` glued to a word
        let mut word = token.as_str();
        let mut ends_segment = false;
        for sep in SEPARATORS {
            if let Some(stripped) = word.strip_suffix(sep) {
                word = stripped;
                ends_segment = true;
                break;
            }
        }
        if !word.is_empty() {
            if let Some(current) = out.last_mut() {
                current.push(word.to_string());
            }
        }
        if ends_segment {
            out.push(Vec::new());
        }
    }
    out.retain(|s| !s.is_empty());
    out
}

/// Identify the install command at the start of a segment and return the
/// ecosystem plus the remaining arguments.
fn installer(segment: &[String]) -> Option<(Ecosystem, &[String])> {
    // Skip env assignments and privilege wrappers.
    let start = segment
        .iter()
        .position(|t| !(t.contains('=') && !t.starts_with('-')) && t != "sudo")?;
    let words = &segment[start..];
    let program = words.first()?.rsplit('/').next()?;
    let arg = |i: usize| words.get(i).map(String::as_str);

    let (ecosystem, consumed) = match (program, arg(1), arg(2)) {
        ("npm" | "pnpm", Some("install" | "i" | "add"), _) => (Ecosystem::Npm, 2),
        ("yarn" | "bun", Some("add"), _) => (Ecosystem::Npm, 2),
        ("pip" | "pip3", Some("install"), _) => (Ecosystem::PyPI, 2),
        ("python" | "python3", Some("-m"), Some("pip")) if arg(3) == Some("install") => {
            (Ecosystem::PyPI, 4)
        }
        ("uv", Some("add"), _) => (Ecosystem::PyPI, 2),
        ("uv", Some("pip"), Some("install")) => (Ecosystem::PyPI, 3),
        ("poetry", Some("add"), _) => (Ecosystem::PyPI, 2),
        ("cargo", Some("add"), _) => (Ecosystem::CratesIo, 2),
        ("gem", Some("install"), _) => (Ecosystem::RubyGems, 2),
        ("bundle", Some("add"), _) => (Ecosystem::RubyGems, 2),
        ("go", Some("get"), _) => (Ecosystem::Go, 2),
        ("composer", Some("require"), _) => (Ecosystem::Packagist, 2),
        ("flutter" | "dart", Some("pub"), Some("add")) => (Ecosystem::Pub, 3),
        _ => return None,
    };
    Some((ecosystem, &words[consumed.min(words.len())..]))
}

/// Local paths, URLs, archives, and requirement files are not registry packages.
fn looks_like_package(arg: &str) -> bool {
    !(arg.starts_with('.')
        || arg.starts_with('/')
        || arg.starts_with('~')
        || arg.contains("://")
        || arg.starts_with("git+")
        || arg.starts_with("file:")
        || arg.ends_with(".txt")
        || arg.ends_with(".tgz")
        || arg.ends_with(".tar.gz")
        || arg.ends_with(".whl"))
}

fn parse_spec(ecosystem: Ecosystem, spec: &str) -> Option<PackageRef> {
    let (name, version) = match ecosystem {
        Ecosystem::Npm => split_npm(spec),
        Ecosystem::PyPI => split_python(spec),
        Ecosystem::CratesIo | Ecosystem::Go => match spec.split_once('@') {
            Some((n, v)) => (n, Some(v)),
            None => (spec, None),
        },
        Ecosystem::RubyGems | Ecosystem::Packagist | Ecosystem::Pub => match spec.split_once(':') {
            Some((n, v)) => (n, Some(v)),
            None => (spec, None),
        },
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(PackageRef {
        ecosystem,
        name: name.to_string(),
        version: version.and_then(exact_version),
    })
}

/// `pkg@1.2.3`, `@scope/pkg@1.2.3`, `@scope/pkg`.
fn split_npm(spec: &str) -> (&str, Option<&str>) {
    let search_from = usize::from(spec.starts_with('@'));
    match spec[search_from..].find('@') {
        Some(i) => {
            let at = search_from + i;
            (&spec[..at], Some(&spec[at + 1..]))
        }
        None => (spec, None),
    }
}

/// `pkg==1.2`, `pkg>=1.2`, `pkg[extra]==1.2`, `pkg~=1.2`.
fn split_python(spec: &str) -> (&str, Option<&str>) {
    let end = spec
        .find(|c: char| matches!(c, '=' | '<' | '>' | '~' | '!' | '[' | ';' | ' '))
        .unwrap_or(spec.len());
    let name = &spec[..end];
    let version = spec.find("==").map(|i| &spec[i + 2..]);
    (name, version)
}

/// Keep a pin only when it names one concrete version.
fn exact_version(v: &str) -> Option<String> {
    let v = v.trim().trim_start_matches('=').trim_start_matches('v');
    let exact = v.chars().next().is_some_and(|c| c.is_ascii_digit())
        && !v.contains(['*', 'x', '^', '~', '<', '>', ',', ' ', '|']);
    exact.then(|| v.to_string())
}
