//! Commit history queries.

use crate::models::Identities;
use git2::{ErrorCode, Repository, Sort};

/// Count commits reachable from HEAD whose author e-mail or author name
/// exactly equals one of `identities`.
///
/// An empty repository (unborn HEAD) has no commits.
pub fn count_commits_by(repo: &Repository, identities: &Identities) -> Result<u64, git2::Error> {
    match repo.head() {
        Ok(_) => {}
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            return Ok(0)
        }
        Err(e) => return Err(e),
    }

    if identities.is_empty() {
        return Ok(0);
    }

    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::NONE)?;
    revwalk.push_head()?;

    let mut count = 0;
    for oid in revwalk {
        let commit = repo.find_commit(oid?)?;
        let author = commit.author();

        let by_email = author.email().is_some_and(|email| identities.matches(email));
        let by_name = author.name().is_some_and(|name| identities.matches(name));

        if by_email || by_name {
            count += 1;
        }
    }

    Ok(count)
}
