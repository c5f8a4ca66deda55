use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding this crate's Rust sources. Nothing else is scanned, so
// vendored or generated code elsewhere in the checkout never fails the build.
const SOURCE_DIRS: [&str; 7] = [
    "shared", "dataflow", "bayes", "learn", "cli", "tests", "benches",
];

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

/// One source policy: a line regex, a filter deciding which matched lines are
/// real violations, and the explanation printed when any are found.
struct Policy {
    name: &'static str,
    pattern: String,
    include_build_script: bool,
    is_violation: fn(&str) -> bool,
    explanation: &'static str,
}

// Collects the offending lines of a single file.
struct LineCollector {
    violations: Vec<String>,
    is_violation: fn(&str) -> bool,
}

impl Sink for LineCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.is_violation)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    for policy in policies() {
        if let Err(e) = enforce(&policy) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

fn policies() -> Vec<Policy> {
    vec![
        Policy {
            name: "underscore-prefixed identifiers",
            pattern: r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            include_build_script: true,
            is_violation: underscore_in_code,
            explanation: "Underscore-prefixed names are not allowed in this project.\n   \
                          Either use the binding (removing the underscore) or remove it completely.",
        },
        Policy {
            name: "#[allow(dead_code)] attributes",
            pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
            include_build_script: false,
            is_violation: |_| true,
            explanation: "#[allow(dead_code)] is not allowed in this project.\n   \
                          Either use the code or remove it completely.",
        },
        Policy {
            name: "forbidden comment words",
            pattern: format!(r"(//|/\*).*(?:{})", FORBIDDEN_WORDS.join("|")),
            include_build_script: false,
            is_violation: |_| true,
            explanation: "Comments must describe the code as it is, not the history of edits.\n   \
                          Remove the comment rather than commenting it out.",
        },
        Policy {
            name: "'**' in non-doc comments",
            pattern: r"(//|/\*).*\*\*".to_string(),
            include_build_script: false,
            is_violation: |line| !line.trim_start().starts_with("///"),
            explanation: "The '**' pattern is only allowed in /// doc comments.",
        },
        Policy {
            name: "all-uppercase comments",
            pattern: r"(//|/\*).*".to_string(),
            include_build_script: false,
            is_violation: all_uppercase_comment,
            explanation: "Comments whose letters are all uppercase are not allowed.\n   \
                          Strongly consider deleting the comment completely.",
        },
    ]
}

fn rust_sources(include_build_script: bool) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = SOURCE_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.path().to_path_buf())
        .collect();
    if include_build_script {
        paths.push(PathBuf::from("build.rs"));
    }
    paths
}

fn enforce(policy: &Policy) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(&policy.pattern)?;
    let mut searcher = Searcher::new();

    for path in rust_sources(policy.include_build_script) {
        let mut collector = LineCollector {
            violations: Vec::new(),
            is_violation: policy.is_violation,
        };
        searcher.search_path(&matcher, &path, &mut collector)?;

        if !collector.violations.is_empty() {
            let mut message = format!(
                "\n❌ ERROR: Found {} {} in {}:\n",
                collector.violations.len(),
                policy.name,
                path.display()
            );
            for violation in &collector.violations {
                message.push_str(&format!("   {violation}\n"));
            }
            message.push_str(&format!("\n⚠️ {}\n", policy.explanation));
            return Err(message.into());
        }
    }
    Ok(())
}

// Comments and string literals may mention underscore-prefixed names.
fn underscore_in_code(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*') {
        return false;
    }
    let inside_string = line
        .split('"')
        .enumerate()
        .any(|(index, part)| index % 2 == 1 && part.contains('_'));
    !inside_string
}

fn all_uppercase_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    let comment = if let Some(rest) = trimmed.strip_prefix("///") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        rest
    } else if let Some(start) = line.find("/*") {
        let rest = &line[start + 2..];
        rest.find("*/").map_or(rest, |end| &rest[..end])
    } else {
        return false;
    };
    let letters: Vec<char> = comment.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
}
