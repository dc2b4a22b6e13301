//! Built-in classification rules, in evaluation order.
//!
//! Order is significant: the first matching rule wins. Dependency installs
//! come first, so `npm install x && npm run build` classifies as an install.

use tollgate_core::types::{Domain, Platform};

pub(crate) enum PredicateDef {
    /// Regex over the shell command text.
    Command(&'static str),
    /// File extension (without the dot) of the written path.
    Extension(&'static [&'static str]),
}

pub(crate) struct RuleDef {
    pub id: &'static str,
    pub predicate: PredicateDef,
    pub domain: Domain,
    pub platform: Platform,
}

const fn cmd(id: &'static str, pattern: &'static str, domain: Domain, platform: Platform) -> RuleDef {
    RuleDef {
        id,
        predicate: PredicateDef::Command(pattern),
        domain,
        platform,
    }
}

const SOURCE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "mjs", "cjs", "ts", "tsx", "vue", "svelte", "py", "rs", "go", "java", "kt",
    "kts", "swift", "dart", "cs", "rb", "php", "c", "cc", "cpp", "h", "hpp", "gd",
];

pub(crate) const BUILTIN_RULES: &[RuleDef] = &[
    // Dependency installs
    cmd(
        "dependency-npm",
        r"\b(?:npm|pnpm)\s+(?:install|i|add)\b|\b(?:yarn|bun)\s+add\b",
        Domain::DependencyInstall,
        Platform::Unspecified,
    ),
    cmd(
        "dependency-python",
        r"\bpip3?\s+install\b|\bpython3?\s+-m\s+pip\s+install\b|\buv\s+(?:add|pip\s+install)\b|\bpoetry\s+add\b",
        Domain::DependencyInstall,
        Platform::Unspecified,
    ),
    cmd(
        "dependency-cargo",
        r"\bcargo\s+add\b",
        Domain::DependencyInstall,
        Platform::Unspecified,
    ),
    cmd(
        "dependency-ruby",
        r"\bgem\s+install\b|\bbundle\s+add\b",
        Domain::DependencyInstall,
        Platform::Unspecified,
    ),
    cmd(
        "dependency-go",
        r"\bgo\s+get\b",
        Domain::DependencyInstall,
        Platform::Unspecified,
    ),
    cmd(
        "dependency-composer",
        r"\bcomposer\s+require\b",
        Domain::DependencyInstall,
        Platform::Unspecified,
    ),
    cmd(
        "dependency-pub",
        r"\b(?:flutter|dart)\s+pub\s+add\b",
        Domain::DependencyInstall,
        Platform::Mobile,
    ),
    // Platform builds
    cmd(
        "build-mobile",
        r"\bflutter\s+build\b|\bgradlew?\s+(?:assemble|bundle)\w*|\bxcodebuild\b|\beas\s+build\b|\breact-native\s+(?:bundle|build-android|build-ios)\b|\bfastlane\b",
        Domain::BuildOrDeploy,
        Platform::Mobile,
    ),
    cmd(
        "build-game",
        r"\bgodot\S*\s.*--export|\bUnity(?:\.exe)?\s.*-buildTarget\b|\bRunUAT\S*\s+BuildCookRun\b|\bbutler\s+push\b",
        Domain::BuildOrDeploy,
        Platform::Game,
    ),
    cmd(
        "build-web",
        r"\b(?:npm|pnpm|bun)\s+run\s+build\b|\byarn\s+(?:run\s+)?build\b|\b(?:next|vite|nuxt|astro|ng|gatsby|remix)\s+build\b|\bwebpack\b|\b(?:vercel|netlify|firebase)\s+deploy\b|\bvercel\s+--prod\b",
        Domain::BuildOrDeploy,
        Platform::Web,
    ),
    cmd(
        "build-generic",
        r"\b(?:cargo|go|docker)\s+build\b|\bmake\s+(?:build|release|dist)\b",
        Domain::BuildOrDeploy,
        Platform::Unspecified,
    ),
    // Source edits
    RuleDef {
        id: "source-file",
        predicate: PredicateDef::Extension(SOURCE_EXTENSIONS),
        domain: Domain::FileModification,
        platform: Platform::Unspecified,
    },
];
