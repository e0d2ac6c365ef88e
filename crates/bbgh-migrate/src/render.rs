//! Markdown rendering of migrated bodies and comments.

use crate::config::Settings;
use crate::identity::IdentityResolver;
use crate::model::{
    Activity, ActivityPayload, FieldChange, InlineLocation, PullRequestEndpoint, SourceEntity,
    SourceUser,
};

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M").to_string()
}

fn bitbucket_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"https?://bitbucket\.org/([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)(/commits?/([0-9a-fA-F]{7,40})|/[^\s)\]>]*)?",
        )
        .expect("valid regex")
    })
}

/// Rewrites links to known Bitbucket repositories.
///
/// Commit links become GitHub commit links and bare repository links
/// point at the GitHub repository. Other deep links are left alone since
/// issue numbers differ between the two forges.
#[derive(Debug, Clone, Default)]
pub struct LinkRewriter {
    repositories: BTreeMap<String, String>,
}

impl LinkRewriter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            repositories: settings
                .repo_mapping
                .iter()
                .map(|(bb, gh)| (bb.to_lowercase(), gh.clone()))
                .collect(),
        }
    }

    fn github_repo(&self, bitbucket_repo: &str) -> Option<&str> {
        self.repositories
            .get(&bitbucket_repo.to_lowercase())
            .map(String::as_str)
    }

    pub fn rewrite(&self, text: &str) -> String {
        if self.repositories.is_empty() {
            return text.to_string();
        }
        bitbucket_link_regex()
            .replace_all(text, |caps: &Captures<'_>| {
                let Some(github_repo) = self.github_repo(&caps[1]) else {
                    return caps[0].to_string();
                };
                match (caps.get(2), caps.get(3)) {
                    (_, Some(hash)) => {
                        format!("https://github.com/{github_repo}/commit/{}", hash.as_str())
                    }
                    (Some(rest), None) if rest.as_str() != "/" => caps[0].to_string(),
                    _ => format!("https://github.com/{github_repo}"),
                }
            })
            .into_owned()
    }
}

/// Builds the text of target issues, pull requests and comments.
#[derive(Debug, Clone)]
pub struct Renderer {
    identity: IdentityResolver,
    links: LinkRewriter,
    github_repo: String,
}

impl Renderer {
    pub fn new(identity: IdentityResolver, links: LinkRewriter, github_repo: impl Into<String>) -> Self {
        Self {
            identity,
            links,
            github_repo: github_repo.into(),
        }
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    /// Body for the target issue or pull request, before attachment
    /// references are rewritten.
    pub fn entity_body(&self, entity: &SourceEntity) -> String {
        if entity.is_pull_request() {
            self.pull_request_body(entity)
        } else {
            self.issue_body(entity)
        }
    }

    pub fn issue_body(&self, issue: &SourceEntity) -> String {
        let mut sb = String::new();
        let created_on = format_date(&issue.created_on);
        let updated_on = format_date(&issue.updated_on);

        let _ = writeln!(
            sb,
            "> Created by {} on {created_on}",
            self.identity.mention(issue.author.as_ref(), false)
        );
        if created_on != updated_on {
            let _ = writeln!(sb, "> Last updated on {updated_on}");
        }

        sb.push('\n');
        sb.push_str(&self.links.rewrite(&issue.body));
        sb.push('\n');
        sb
    }

    pub fn pull_request_body(&self, pull: &SourceEntity) -> String {
        let mut sb = String::new();
        let created_on = format_date(&pull.created_on);
        let updated_on = format_date(&pull.updated_on);

        let author = match pull.author {
            Some(_) => format!("by {} ", self.identity.mention(pull.author.as_ref(), false)),
            None => String::new(),
        };
        let _ = writeln!(
            sb,
            "> **Pull request** :twisted_rightwards_arrows: created {author}on {created_on}"
        );
        if created_on != updated_on {
            let _ = writeln!(sb, "> Last updated on {updated_on}");
        }
        let _ = writeln!(sb, "> Original Bitbucket pull request id: {}", pull.reference.id);

        if let Some(details) = &pull.pull_request {
            if !details.participants.is_empty() {
                sb.push_str(">\n> Participants:\n>\n");
                for participant in &details.participants {
                    let _ = write!(sb, "> * {}", self.identity.mention(participant.user.as_ref(), false));
                    if participant.reviewer {
                        sb.push_str(" (reviewer)");
                    }
                    if participant.approved {
                        sb.push_str(" :heavy_check_mark:");
                    }
                    sb.push('\n');
                }
            }

            sb.push_str(">\n");
            let _ = writeln!(sb, "> Source: {}", self.endpoint(&details.source));
            let _ = writeln!(sb, "> Destination: {}", self.endpoint(&details.destination));
            if let Some(hash) = &details.merge_commit {
                let _ = writeln!(
                    sb,
                    "> Merge commit: https://github.com/{}/commit/{hash}",
                    self.github_repo
                );
            }
        }

        sb.push_str(">\n");
        let _ = writeln!(sb, "> State: **`{}`**", pull.state);

        sb.push('\n');
        sb.push_str(&self.links.rewrite(&pull.body));
        sb.push('\n');
        sb
    }

    fn endpoint(&self, endpoint: &PullRequestEndpoint) -> String {
        let branch = endpoint.branch.as_deref().unwrap_or("(unknown)");
        let github_repo = endpoint
            .repository
            .as_deref()
            .and_then(|bb| self.links.github_repo(bb))
            .unwrap_or(&self.github_repo);

        match (&endpoint.repository, &endpoint.commit) {
            (None, None) => format!("unknown commit on branch `{branch}` of an unknown repo"),
            (_, Some(hash)) => {
                format!("https://github.com/{github_repo}/commit/{hash} on branch `{branch}`")
            }
            (Some(_), None) => format!("unidentified commit on branch `{branch}`"),
        }
    }

    /// Body of the comment replaying `activity`, without its marker.
    pub fn activity_body(&self, activity: &Activity) -> String {
        let on_date = format_date(&activity.created_on);
        let author = activity.author.as_ref();

        match &activity.payload {
            ActivityPayload::Comment { text, inline } => {
                let mut sb = format!(
                    "> {} commented on {on_date}\n",
                    self.identity.mention(author, true)
                );
                if let Some(location) = inline {
                    sb.push_str(">\n");
                    sb.push_str(&inline_location(location));
                }
                sb.push('\n');
                sb.push_str(&self.links.rewrite(text));
                sb
            }
            ActivityPayload::Changes(changes) => self.changes(author, &on_date, changes),
            ActivityPayload::Approval => format!(
                "> {} approved :heavy_check_mark: the pull request on {on_date}",
                self.identity.mention(author, true)
            ),
            ActivityPayload::StateUpdate { state } => match author {
                Some(_) => format!(
                    "> {} changed the status to `{state}` on {on_date}",
                    self.identity.mention(author, true)
                ),
                None => format!("> the status has been changed to `{state}` on {on_date}"),
            },
        }
    }

    fn changes(&self, author: Option<&SourceUser>, on_date: &str, changes: &[FieldChange]) -> String {
        let mut sb = format!("> {} on {on_date}:\n", self.identity.mention(author, true));
        for change in changes {
            let line = match change.field.as_str() {
                "content" => "> * edited the description\n".to_string(),
                "title" => "> * edited the title\n".to_string(),
                "assignee" => {
                    let old = self.assignee_mention(change.old.as_deref());
                    let new = self.assignee_mention(change.new.as_deref());
                    format!("> * changed the assignee from {old} to {new}\n")
                }
                field => format!(
                    "> * changed `{field}` from `{}` to `{}`\n",
                    change.old.as_deref().unwrap_or("(none)"),
                    change.new.as_deref().unwrap_or("(none)")
                ),
            };
            sb.push_str(&line);
        }
        sb
    }

    fn assignee_mention(&self, nickname: Option<&str>) -> String {
        match nickname.filter(|n| !n.is_empty()) {
            Some(nickname) => self.identity.mention(Some(&SourceUser::new(nickname)), false),
            None => "(none)".to_string(),
        }
    }
}

fn inline_location(location: &InlineLocation) -> String {
    let prefix = if location.outdated {
        "Outdated location"
    } else {
        "Location"
    };
    let path = &location.path;

    match (location.from, location.to) {
        (None, None) => format!("> **{prefix}:** `{path}`\n"),
        (Some(from), Some(to)) if from != to => {
            format!("> **{prefix}:** lines {from}-{to} of `{path}`\n")
        }
        (Some(line), _) | (None, Some(line)) => {
            format!("> **{prefix}:** line {line} of `{path}`\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityRef, Participant, PullRequestDetails};
    use crate::types::IdentityMode;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn settings() -> Settings {
        Settings::default()
            .with_user("jdoe", "john-doe")
            .with_repo("team/app", "org/app")
    }

    fn renderer() -> Renderer {
        let settings = Arc::new(settings());
        Renderer::new(
            IdentityResolver::new(settings.clone(), IdentityMode::Lenient),
            LinkRewriter::new(&settings),
            "org/app",
        )
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 4, hour, minute, 0).unwrap()
    }

    fn issue() -> SourceEntity {
        SourceEntity {
            reference: EntityRef::issue(12),
            title: "Crash".to_string(),
            body: "It crashes since https://bitbucket.org/team/app/commits/abcdef1234".to_string(),
            author: Some(SourceUser::new("jdoe")),
            assignee: None,
            state: "open".to_string(),
            issue_kind: Some("bug".to_string()),
            priority: Some("major".to_string()),
            component: None,
            created_on: at(10, 0),
            updated_on: at(11, 30),
            activities: vec![],
            attachments: vec![],
            pull_request: None,
        }
    }

    #[test]
    fn test_link_rewriter() {
        let links = LinkRewriter::new(&settings());

        assert_eq!(
            links.rewrite("see https://bitbucket.org/team/app/commits/abcdef1234 now"),
            "see https://github.com/org/app/commit/abcdef1234 now"
        );
        assert_eq!(
            links.rewrite("repo: https://bitbucket.org/Team/App now"),
            "repo: https://github.com/org/app now"
        );
        assert_eq!(
            links.rewrite("https://bitbucket.org/team/app/issues/3"),
            "https://bitbucket.org/team/app/issues/3"
        );
        assert_eq!(
            links.rewrite("https://bitbucket.org/other/repo/commits/abcdef1234"),
            "https://bitbucket.org/other/repo/commits/abcdef1234"
        );
    }

    #[test]
    fn test_issue_body() {
        let body = renderer().issue_body(&issue());

        assert_eq!(
            body,
            "> Created by **@john-doe** on 2021-03-04 10:00\n\
             > Last updated on 2021-03-04 11:30\n\
             \n\
             It crashes since https://github.com/org/app/commit/abcdef1234\n"
        );
    }

    #[test]
    fn test_pull_request_body() {
        let mut pull = issue();
        pull.reference = EntityRef::pull_request(7);
        pull.state = "MERGED".to_string();
        pull.updated_on = pull.created_on;
        pull.author = Some(SourceUser::new("alice"));
        pull.pull_request = Some(PullRequestDetails {
            source: PullRequestEndpoint {
                branch: Some("feature".to_string()),
                commit: Some("1111111".to_string()),
                repository: Some("team/app".to_string()),
            },
            destination: PullRequestEndpoint {
                branch: Some("main".to_string()),
                commit: None,
                repository: Some("team/app".to_string()),
            },
            merge_commit: Some("2222222".to_string()),
            participants: vec![Participant {
                user: Some(SourceUser::new("jdoe")),
                reviewer: true,
                approved: true,
            }],
            reviewers: vec![],
        });

        let body = renderer().pull_request_body(&pull);

        assert!(body.starts_with(
            "> **Pull request** :twisted_rightwards_arrows: created by bitbucket user **alice** on 2021-03-04 10:00\n"
        ));
        assert!(!body.contains("Last updated"));
        assert!(body.contains("> Original Bitbucket pull request id: 7\n"));
        assert!(body.contains("> * **@john-doe** (reviewer) :heavy_check_mark:\n"));
        assert!(body.contains("> Source: https://github.com/org/app/commit/1111111 on branch `feature`\n"));
        assert!(body.contains("> Destination: unidentified commit on branch `main`\n"));
        assert!(body.contains("> Merge commit: https://github.com/org/app/commit/2222222\n"));
        assert!(body.contains("> State: **`MERGED`**\n"));
    }

    #[test]
    fn test_comment_with_inline_location() {
        let activity = Activity {
            key: "comment-1".to_string(),
            author: None,
            created_on: at(9, 5),
            payload: ActivityPayload::Comment {
                text: "nit".to_string(),
                inline: Some(InlineLocation {
                    path: "src/lib.rs".to_string(),
                    from: Some(3),
                    to: Some(9),
                    outdated: true,
                }),
            },
        };

        assert_eq!(
            renderer().activity_body(&activity),
            "> A former bitbucket user (account deleted) commented on 2021-03-04 09:05\n\
             >\n\
             > **Outdated location:** lines 3-9 of `src/lib.rs`\n\
             \n\
             nit"
        );
    }

    #[test]
    fn test_inline_single_line() {
        let location = InlineLocation {
            path: "a.rs".to_string(),
            from: None,
            to: Some(4),
            outdated: false,
        };
        assert_eq!(inline_location(&location), "> **Location:** line 4 of `a.rs`\n");
    }

    #[test]
    fn test_change_set() {
        let activity = Activity {
            key: "change-5".to_string(),
            author: Some(SourceUser::new("jdoe")),
            created_on: at(12, 0),
            payload: ActivityPayload::Changes(vec![
                FieldChange {
                    field: "title".to_string(),
                    old: Some("a".to_string()),
                    new: Some("b".to_string()),
                },
                FieldChange {
                    field: "assignee".to_string(),
                    old: None,
                    new: Some("bob".to_string()),
                },
                FieldChange {
                    field: "state".to_string(),
                    old: Some("new".to_string()),
                    new: Some("resolved".to_string()),
                },
            ]),
        };

        assert_eq!(
            renderer().activity_body(&activity),
            "> **@john-doe** on 2021-03-04 12:00:\n\
             > * edited the title\n\
             > * changed the assignee from (none) to bitbucket user **bob**\n\
             > * changed `state` from `new` to `resolved`\n"
        );
    }

    #[test]
    fn test_state_update_and_approval() {
        let r = renderer();
        let update = Activity {
            key: "update-1".to_string(),
            author: None,
            created_on: at(8, 0),
            payload: ActivityPayload::StateUpdate {
                state: "MERGED".to_string(),
            },
        };
        assert_eq!(
            r.activity_body(&update),
            "> the status has been changed to `MERGED` on 2021-03-04 08:00"
        );

        let approval = Activity {
            author: Some(SourceUser::new("jdoe")),
            payload: ActivityPayload::Approval,
            ..update
        };
        assert_eq!(
            r.activity_body(&approval),
            "> **@john-doe** approved :heavy_check_mark: the pull request on 2021-03-04 08:00"
        );
    }
}
