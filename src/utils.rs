/// Returns the branch name of a fully qualified ref.
///
/// Drops the first two `/`-separated segments (`refs/heads/`) and keeps the
/// rest, so branches containing slashes survive intact. The prefix itself is
/// not validated; a ref with two or fewer segments yields an empty string.
pub fn short_branch_name(full_ref: &str) -> String {
    full_ref.split('/').skip(2).collect::<Vec<_>>().join("/")
}
