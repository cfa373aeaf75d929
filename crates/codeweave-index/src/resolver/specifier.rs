//! Classification and splitting of import specifiers.

use std::sync::LazyLock;

use regex::Regex;

static SEMVER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)").unwrap());
static COMMIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-f]{7,40}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    /// `./x`, `../x`, `/abs/x`.
    Path,
    /// `node:fs`.
    Builtin,
    Url,
    Git,
    /// Bare package name, possibly scoped, possibly with a subpath.
    Package,
}

#[must_use]
pub fn classify(specifier: &str) -> SpecifierKind {
    if is_path(specifier) {
        SpecifierKind::Path
    } else if specifier.starts_with("node:") {
        SpecifierKind::Builtin
    } else if specifier.starts_with("http://") || specifier.starts_with("https://") {
        SpecifierKind::Url
    } else if is_git(specifier) {
        SpecifierKind::Git
    } else {
        SpecifierKind::Package
    }
}

/// True iff the specifier is not a relative or absolute path.
#[must_use]
pub fn is_external(specifier: &str) -> bool {
    !is_path(specifier)
}

fn is_path(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
}

fn is_git(specifier: &str) -> bool {
    specifier.starts_with("git+")
        || specifier.starts_with("git://")
        || specifier.starts_with("git@")
        || specifier.starts_with("github:")
        || specifier.starts_with("gitlab:")
        || specifier.starts_with("bitbucket:")
        || specifier.split('#').next().is_some_and(|s| s.ends_with(".git"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSpecifier {
    pub name: String,
    pub subpath: Option<String>,
}

/// Split a bare specifier into package name and subpath, keeping the
/// `@scope/` prefix with the name.
///
/// `@scope/pkg/a/b` → (`@scope/pkg`, `a/b`); `lodash/fp` → (`lodash`, `fp`).
#[must_use]
pub fn parse_specifier(specifier: &str) -> ParsedSpecifier {
    let specifier = specifier.strip_prefix("node:").unwrap_or(specifier);
    let mut parts = specifier.splitn(3, '/');
    let first = parts.next().unwrap_or_default();

    let (name, rest) = if first.starts_with('@') {
        match parts.next() {
            Some(pkg) => (format!("{first}/{pkg}"), parts.next()),
            None => (first.to_owned(), None),
        }
    } else {
        let rest = specifier.split_once('/').map(|(_, rest)| rest);
        (first.to_owned(), rest)
    };

    ParsedSpecifier {
        name,
        subpath: rest.filter(|s| !s.is_empty()).map(str::to_owned),
    }
}

/// First `@x.y.z` token in a URL, without the `@` or a leading `v`.
#[must_use]
pub fn url_version(specifier: &str) -> Option<String> {
    SEMVER_RE
        .captures(specifier)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

/// Package name carried by a CDN-style URL (`https://esm.sh/react@18/...`).
/// Falls back to host plus path.
#[must_use]
pub fn url_package_name(specifier: &str) -> String {
    let Ok(url) = url::Url::parse(specifier) else {
        return specifier.to_owned();
    };
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    for (i, segment) in segments.iter().enumerate() {
        if let Some(at) = segment.rfind('@').filter(|at| *at > 0) {
            let bare = &segment[..at];
            return match i.checked_sub(1).map(|p| segments[p]) {
                Some(scope) if scope.starts_with('@') => format!("{scope}/{bare}"),
                _ => bare.to_owned(),
            };
        }
    }

    let host = url.host_str().unwrap_or_default();
    format!("{host}{}", url.path().trim_end_matches('/'))
}

/// Repository name and commit of a git specifier.
#[must_use]
pub fn git_parts(specifier: &str) -> (String, Option<String>) {
    let (location, fragment) = match specifier.split_once('#') {
        Some((location, fragment)) => (location, Some(fragment)),
        None => (specifier, None),
    };
    let name = location
        .rsplit(['/', ':'])
        .find(|s| !s.is_empty())
        .unwrap_or(location)
        .trim_end_matches(".git")
        .to_owned();
    let commit = fragment
        .filter(|f| COMMIT_RE.is_match(f))
        .map(str::to_owned);
    (name, commit)
}
