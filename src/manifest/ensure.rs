//! Ensure-file merging for the package tool.

/// Merges ensure files into the single manifest fed to `cipd ensure`.
///
/// `$` directives must precede every package line, so the directives of all
/// inputs come first (in input order), followed by the remaining lines of all
/// inputs (in input order).
pub fn combine_ensure_files<S: AsRef<str>>(files: &[S]) -> String {
    let is_directive = |line: &&str| line.trim_start().starts_with('$');

    let directives = files
        .iter()
        .flat_map(|content| content.as_ref().lines().filter(is_directive));
    let packages = files
        .iter()
        .flat_map(|content| content.as_ref().lines().filter(|l| !is_directive(l)));

    let mut combined = String::new();
    for line in directives.chain(packages) {
        combined.push_str(line);
        combined.push('\n');
    }
    combined
}
