//! GitHub: starred and owned repositories plus their owners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::index_entry::{IndexEntryDraft, IndexMainType};
use crate::link::IndexRole;
use crate::mapping::{
    require, tag_relations, unexpected, CanonicalInsert, MapContext, MappedRow, RelationIntent, SourceMapper,
};
use crate::record::{non_empty, RecordDraft, RecordType, SourceTag};
use crate::staging::{StagingPayload, StagingRef, StagingRow, StagingTable};

/// A GitHub account.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub login: String,
    pub name: Option<String>,
    pub html_url: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

/// A repository.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub name: String,
    pub full_name: Option<String>,
    /// External id of the owner in `github_users`.
    pub owner_id: Option<String>,
    pub description: Option<String>,
    pub readme: Option<String>,
    pub html_url: Option<String>,
    pub topics: Vec<String>,
    pub is_private: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Mapper for GitHub.
#[derive(Debug, Default, Clone, Copy)]
pub struct GithubMapper;

impl GithubMapper {
    fn user(row: &StagingRow, user: &User) -> Result<MappedRow, MappingError> {
        let login = require(row, "login", Some(user.login.as_str()))?;
        let name = non_empty(user.name.as_deref()).unwrap_or(login);
        let draft = IndexEntryDraft::new(SourceTag::Github, IndexMainType::Entity, name)
            .short_name(Some(login))
            .url(user.html_url.as_deref())
            .image_url(user.avatar_url.as_deref())
            .notes(user.bio.as_deref());
        Ok(MappedRow::new(CanonicalInsert::IndexEntry(draft)))
    }

    fn repository(row: &StagingRow, repo: &Repository) -> Result<MappedRow, MappingError> {
        let name = require(row, "name", Some(repo.name.as_str()))?;
        let title = non_empty(repo.full_name.as_deref()).unwrap_or(name);

        let draft = RecordDraft::new(
            SourceTag::Github,
            RecordType::Artifact,
            StagingTable::GithubRepositories,
            &row.external_id,
        )
        .title(Some(title))
        .summary(repo.description.as_deref())
        .content(repo.readme.as_deref())
        .url(repo.html_url.as_deref())
        .private(repo.is_private)
        .content_dates(repo.created_at, repo.pushed_at);

        let owner = repo.owner_id.iter().map(|id| RelationIntent::IndexEntry {
            role: IndexRole::Creator,
            entry: StagingRef::new(StagingTable::GithubUsers, id.as_str()),
        });

        Ok(MappedRow::new(CanonicalInsert::Record(draft))
            .relate_all(owner)
            .relate_all(tag_relations(SourceTag::Github, &repo.topics)))
    }
}

impl SourceMapper for GithubMapper {
    fn source(&self) -> SourceTag {
        SourceTag::Github
    }

    fn tables(&self) -> &'static [StagingTable] {
        &[StagingTable::GithubUsers, StagingTable::GithubRepositories]
    }

    fn map_row(&self, row: &StagingRow, _ctx: &MapContext<'_>) -> Result<MappedRow, MappingError> {
        match &row.payload {
            StagingPayload::GithubUsers(u) => Self::user(row, u),
            StagingPayload::GithubRepositories(r) => Self::repository(row, r),
            _ => Err(unexpected(self.source(), row)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ExtensionProbe;

    fn map(row: &StagingRow) -> Result<MappedRow, MappingError> {
        GithubMapper.map_row(row, &MapContext::new(&ExtensionProbe))
    }

    #[test]
    fn user_name_falls_back_to_login() {
        let row = StagingRow::new(
            "u1",
            StagingPayload::GithubUsers(User {
                login: "octocat".to_string(),
                name: Some(" ".to_string()),
                ..User::default()
            }),
        );
        let CanonicalInsert::IndexEntry(draft) = map(&row).unwrap().insert else {
            panic!("expected index entry");
        };
        assert_eq!(draft.name, "octocat");
        assert_eq!(draft.short_name.as_deref(), Some("octocat"));
    }

    #[test]
    fn repository_maps_to_artifact_with_owner_and_topics() {
        let row = StagingRow::new(
            "r1",
            StagingPayload::GithubRepositories(Repository {
                name: "hello-world".to_string(),
                full_name: Some("octocat/hello-world".to_string()),
                owner_id: Some("u1".to_string()),
                description: Some("My first repository".to_string()),
                html_url: Some("https://github.com/octocat/hello-world".to_string()),
                topics: vec!["demo".to_string(), "git".to_string()],
                ..Repository::default()
            }),
        );
        let mapped = map(&row).unwrap();
        let CanonicalInsert::Record(draft) = &mapped.insert else {
            panic!("expected record");
        };
        assert_eq!(draft.record_type, RecordType::Artifact);
        assert_eq!(draft.title.as_deref(), Some("octocat/hello-world"));
        assert_eq!(draft.summary.as_deref(), Some("My first repository"));
        assert_eq!(mapped.relations.len(), 3);
        assert!(mapped.relations.contains(&RelationIntent::IndexEntry {
            role: IndexRole::Creator,
            entry: StagingRef::new(StagingTable::GithubUsers, "u1"),
        }));
    }

    #[test]
    fn wrong_payload_is_rejected() {
        let row = StagingRow::new(
            "x",
            StagingPayload::BrowserHistory(crate::mapping::sources::browser_history::Visit::default()),
        );
        assert!(matches!(map(&row), Err(MappingError::UnexpectedPayload { .. })));
    }
}
