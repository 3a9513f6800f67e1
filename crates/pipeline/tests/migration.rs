//! End-to-end migrations against the in-memory source and target.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use casebridge_core::source::{AttachmentFile, SourceAttachmentRef, SourceUser};
use casebridge_core::target::TargetAuthor;
use casebridge_pipeline::{run_migration, MigrationSettings};
use serde_json::json;

use common::{context, from_json, project, section, system_field, FakeSource, FakeTarget};

fn screenshot() -> AttachmentFile {
    AttachmentFile {
        filename: "shot.png".into(),
        mime: "image/png".into(),
        bytes: vec![1, 2, 3],
    }
}

/// One single-suite project with every entity kind filled in.
fn alpha_source() -> FakeSource {
    let mut source = FakeSource {
        projects: vec![project(1, "Alpha Test", 1)],
        users: vec![SourceUser {
            id: 5,
            name: "Ann".into(),
            email: "ann@example.com".into(),
            is_active: true,
            role: None,
        }],
        priorities: from_json(json!([{"id": 2, "name": "High"}])),
        statuses: from_json(json!([
            {"id": 1, "name": "passed", "label": "Passed"},
            {"id": 5, "name": "failed", "label": "Failed"},
        ])),
        case_fields: from_json(json!([{
            "id": 1, "name": "steps_separated", "system_name": "custom_steps_separated",
            "label": "Steps", "type_id": 10, "is_active": true,
        }])),
        ..FakeSource::default()
    };

    source.sections.insert(
        (1, None),
        vec![section(2, "Child", Some(1)), section(1, "Root", None)],
    );
    source.cases.insert(
        (1, None),
        from_json(json!([
            {"id": 100, "title": "Login", "section_id": 1, "priority_id": 2, "created_by": 5, "created_on": 1000},
            {
                "id": 101, "title": "Logout", "section_id": 2, "created_by": 99, "created_on": 1000,
                "custom_steps_separated": [
                    {"content": "Click ![](index.php?/attachments/get/E_7)", "expected": "Signed out"},
                ],
            },
        ])),
    );
    source.files.insert("7".into(), screenshot());
    source
        .milestones
        .insert(1, from_json(json!([{"id": 9, "name": "R1"}])));
    source.configs.insert(
        1,
        from_json(json!([{"id": 3, "name": "Browsers", "configs": [{"id": 31, "name": "Chrome"}]}])),
    );
    source.runs.insert(
        1,
        from_json(json!([{
            "id": 50, "name": "Smoke", "created_on": 1000, "milestone_id": 9, "config_ids": [31],
            "created_by": 5, "is_completed": true, "completed_on": 2000,
        }])),
    );
    source.tests.insert(
        50,
        from_json(json!([{"id": 500, "case_id": 100}, {"id": 501, "case_id": 101}])),
    );
    source.results.insert(
        50,
        from_json(json!([
            {"id": 1, "test_id": 500, "status_id": 1, "created_on": 1100, "created_by": 5, "comment": "ok"},
            {"id": 2, "test_id": 500, "status_id": null, "created_on": 1200, "comment": "note"},
            {"id": 3, "test_id": 501, "status_id": 3, "created_on": 1150},
            {"id": 4, "test_id": 501, "status_id": 5, "created_on": 1300, "elapsed": "1m 30s", "attachment_ids": ["E_7"]},
        ])),
    );
    source
}

fn alpha_target() -> FakeTarget {
    FakeTarget {
        authors: vec![TargetAuthor {
            id: 42,
            email: Some("ann@example.com".into()),
        }],
        system_fields: vec![
            system_field("priority", &[(3, "High", None)]),
            system_field(
                "result_status",
                &[(1, "Passed", Some("passed")), (2, "Failed", Some("failed"))],
            ),
        ],
        ..FakeTarget::default()
    }
}

#[tokio::test]
async fn migrates_a_single_suite_project() {
    let target = Arc::new(alpha_target());
    let ctx = context(alpha_source(), Arc::clone(&target), MigrationSettings::default());

    let stats = run_migration(&ctx).await.unwrap();

    target.written(|w| {
        assert_eq!(w.projects.len(), 1);
        assert_eq!(w.projects[0].code, "AT");
        assert_eq!(w.projects[0].title, "Alpha Test");

        // Sections are created parent first.
        let titles: Vec<_> = w.suites.iter().map(|(_, _, s)| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Root", "Child"]);
        let root_id = w.suites[0].1;
        let child_id = w.suites[1].1;
        assert_eq!(w.suites[0].2.parent_id, None);
        assert_eq!(w.suites[1].2.parent_id, Some(root_id));

        assert_eq!(w.cases.len(), 1);
        let cases = &w.cases[0].1;
        assert_eq!(cases[0].id, 100);
        assert_eq!(cases[0].suite_id, Some(root_id));
        assert_eq!(cases[0].author_id, 42);
        assert_eq!(cases[0].priority, 3);
        assert_eq!(cases[1].suite_id, Some(child_id));
        assert_eq!(cases[1].author_id, 1);
        assert_eq!(cases[1].steps.len(), 1);
        assert_eq!(
            cases[1].steps[0].action,
            "Click ![shot.png](https://target.test/shot.png)"
        );

        // The attachment is uploaded once and reused by the result.
        assert_eq!(w.uploads, vec![("AT".to_string(), "shot.png".to_string())]);

        let milestone_id = w.milestones[0].1;
        let config_id = w.configurations[0].2;
        assert_eq!(w.runs.len(), 1);
        let (_, run_id, run) = &w.runs[0];
        assert_eq!(run.title, "Smoke");
        assert_eq!(run.start_time, "1970-01-01 00:16:40");
        assert_eq!(run.end_time.as_deref(), Some("1970-01-01 00:33:20"));
        assert_eq!(run.author_id, 42);
        assert_eq!(run.milestone_id, Some(milestone_id));
        assert_eq!(run.configurations, vec![config_id]);
        assert_eq!(run.cases, vec![100, 101]);

        assert_eq!(w.results.len(), 1);
        let (results_run, results) = &w.results[0];
        assert_eq!(results_run, run_id);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].case_id, 100);
        assert_eq!(results[0].status, "passed");
        assert_eq!(
            results[0].comment,
            "ok\nOn 1970-01-01 00:20:00 a comment was added:\nnote"
        );
        assert_eq!(results[1].case_id, 101);
        assert_eq!(results[1].status, "failed");
        assert_eq!(results[1].time_ms, 90_000);
        assert_eq!(results[1].start_time, Some(1210));
        assert_eq!(results[1].attachments, vec!["hash-shot.png".to_string()]);
    });

    let project = &stats.projects["AT"];
    assert_eq!(project.source.suites, 2);
    assert_eq!(project.target.suites, 2);
    assert_eq!(project.target.cases, 2);
    assert_eq!(project.target.runs, 1);
    assert_eq!(project.source.results, 4);
    assert_eq!(project.target.results, 2);
    assert_eq!(project.target.milestones, 1);
    assert_eq!(project.target.configurations, 1);
    assert_eq!(stats.users.source, 1);
    assert_eq!(stats.attachments.target, 1);
    assert!(stats.failures.is_empty(), "unexpected failures: {:?}", stats.failures);
}

#[tokio::test]
async fn failed_project_does_not_stop_the_others() {
    let mut old = project(3, "Old", 1);
    old.is_completed = true;
    let mut source = FakeSource {
        projects: vec![project(1, "Alpha", 1), project(2, "Beta", 1), old],
        ..FakeSource::default()
    };
    source
        .sections
        .insert((2, None), vec![section(20, "Main", None)]);
    source.cases.insert(
        (2, None),
        from_json(json!([{"id": 200, "title": "Search", "section_id": 20}])),
    );

    let target = Arc::new(FakeTarget {
        failing_projects: vec!["Alpha".into()],
        ..FakeTarget::default()
    });
    let ctx = context(source, Arc::clone(&target), MigrationSettings::default());

    let stats = run_migration(&ctx).await.unwrap();

    target.written(|w| {
        let titles: Vec<_> = w.projects.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Beta"]);
        assert_eq!(w.cases.len(), 1);
        assert_eq!(w.cases[0].0, w.projects[0].code);
        assert_eq!(w.cases[0].1[0].suite_id, Some(w.suites[0].1));
    });

    assert_eq!(stats.failures.get("projects"), Some(&1));
    let planned: Vec<_> = stats.projects.values().map(|p| p.title.as_str()).collect();
    assert!(planned.contains(&"Beta"));
    assert!(!planned.contains(&"Old"));
}

#[tokio::test]
async fn existing_project_code_is_reused() {
    let mut source = FakeSource {
        projects: vec![project(1, "Alpha Test", 1)],
        ..FakeSource::default()
    };
    source
        .sections
        .insert((1, None), vec![section(1, "Root", None)]);

    let target = Arc::new(FakeTarget {
        existing_codes: vec!["AT".into()],
        ..FakeTarget::default()
    });
    let ctx = context(source, Arc::clone(&target), MigrationSettings::default());

    let stats = run_migration(&ctx).await.unwrap();

    target.written(|w| {
        assert!(w.projects.is_empty());
        assert_eq!(w.suites.len(), 1);
        assert_eq!(w.suites[0].0, "AT");
    });
    assert!(stats.failures.is_empty());
}

#[tokio::test]
async fn multi_suite_project_nests_sections_under_suites() {
    let mut source = FakeSource {
        projects: vec![project(1, "Multi", 3)],
        ..FakeSource::default()
    };
    source.suites.insert(
        1,
        from_json(json!([
            {"id": 7, "name": "API", "description": "Calls"},
            {"id": 8, "name": "UI"},
        ])),
    );
    source.sections.insert(
        (1, Some(7)),
        vec![section(70, "Auth", None), section(71, "Tokens", Some(70))],
    );
    source
        .sections
        .insert((1, Some(8)), vec![section(80, "Forms", None)]);
    source.cases.insert(
        (1, Some(7)),
        from_json(json!([{"id": 700, "title": "Refresh token", "section_id": 71}])),
    );
    source.cases.insert(
        (1, Some(8)),
        from_json(json!([{"id": 800, "title": "Submit form", "section_id": 80}])),
    );

    let target = Arc::new(FakeTarget::default());
    let ctx = context(source, Arc::clone(&target), MigrationSettings::default());

    run_migration(&ctx).await.unwrap();

    target.written(|w| {
        let suites: HashMap<&str, (i64, Option<i64>)> = w
            .suites
            .iter()
            .map(|(_, id, s)| (s.title.as_str(), (*id, s.parent_id)))
            .collect();
        assert_eq!(suites.len(), 5);
        assert_eq!(suites["API"].1, None);
        assert_eq!(suites["UI"].1, None);
        assert_eq!(suites["Auth"].1, Some(suites["API"].0));
        assert_eq!(suites["Tokens"].1, Some(suites["Auth"].0));
        assert_eq!(suites["Forms"].1, Some(suites["UI"].0));

        let case_suites: HashMap<i64, Option<i64>> = w
            .cases
            .iter()
            .flat_map(|(_, cases)| cases.iter().map(|c| (c.id, c.suite_id)))
            .collect();
        assert_eq!(case_suites[&700], Some(suites["Tokens"].0));
        assert_eq!(case_suites[&800], Some(suites["Forms"].0));
    });
}

#[tokio::test]
async fn bulk_attachment_pass_files_by_first_project() {
    let mut source = FakeSource {
        projects: vec![project(1, "Alpha Test", 1)],
        attachments: vec![
            SourceAttachmentRef {
                id: "E_7".into(),
                project_ids: vec![1],
            },
            SourceAttachmentRef {
                id: "8".into(),
                project_ids: vec![99],
            },
            SourceAttachmentRef {
                id: "9".into(),
                project_ids: vec![],
            },
        ],
        ..FakeSource::default()
    };
    source.files.insert("7".into(), screenshot());
    source
        .sections
        .insert((1, None), vec![section(1, "Root", None)]);
    source.cases.insert(
        (1, None),
        from_json(json!([{
            "id": 100, "title": "Login", "section_id": 1,
            "custom_steps_separated": [{"content": "See ![](index.php?/attachments/get/7)"}],
        }])),
    );
    source.case_fields = from_json(json!([{
        "id": 1, "name": "steps_separated", "system_name": "custom_steps_separated",
        "label": "Steps", "type_id": 10, "is_active": true,
    }]));

    let target = Arc::new(FakeTarget::default());
    let settings = MigrationSettings {
        attachments_bulk_import: true,
        ..MigrationSettings::default()
    };
    let ctx = context(source, Arc::clone(&target), settings);

    let stats = run_migration(&ctx).await.unwrap();

    target.written(|w| {
        assert_eq!(w.uploads, vec![("AT".to_string(), "shot.png".to_string())]);
        assert_eq!(
            w.cases[0].1[0].steps[0].action,
            "See ![shot.png](https://target.test/shot.png)"
        );
    });
    assert_eq!(stats.attachments.source, 3);
    assert_eq!(stats.attachments.target, 1);
}

#[tokio::test]
async fn failed_section_listing_still_imports_cases_and_runs() {
    let mut source = FakeSource {
        projects: vec![project(1, "Alpha Test", 1)],
        failing_sections: vec![(1, None)],
        ..FakeSource::default()
    };
    source.cases.insert(
        (1, None),
        from_json(json!([{"id": 100, "title": "Login", "section_id": 1}])),
    );
    source.runs.insert(
        1,
        from_json(json!([{"id": 50, "name": "Smoke", "created_on": 1000}])),
    );
    source
        .tests
        .insert(50, from_json(json!([{"id": 500, "case_id": 100}])));
    source.results.insert(
        50,
        from_json(json!([{"id": 1, "test_id": 500, "status_id": 1, "created_on": 1100}])),
    );

    let target = Arc::new(FakeTarget::default());
    let ctx = context(source, Arc::clone(&target), MigrationSettings::default());

    let stats = run_migration(&ctx).await.unwrap();

    target.written(|w| {
        assert!(w.suites.is_empty());
        assert_eq!(w.cases.len(), 1);
        assert_eq!(w.cases[0].1[0].id, 100);
        assert_eq!(w.cases[0].1[0].suite_id, None);
        assert_eq!(w.runs.len(), 1);
        assert_eq!(w.results.len(), 1);
    });
    assert_eq!(stats.failures.get("suites"), Some(&1));
    assert_eq!(stats.failures.len(), 1, "unexpected failures: {:?}", stats.failures);
}

#[tokio::test]
async fn failed_suite_sections_do_not_stop_the_next_suite() {
    let mut source = FakeSource {
        projects: vec![project(1, "Multi", 3)],
        failing_sections: vec![(1, Some(7))],
        ..FakeSource::default()
    };
    source.suites.insert(
        1,
        from_json(json!([{"id": 7, "name": "API"}, {"id": 8, "name": "UI"}])),
    );
    source
        .sections
        .insert((1, Some(8)), vec![section(80, "Forms", None)]);
    source.cases.insert(
        (1, Some(7)),
        from_json(json!([{"id": 700, "title": "Refresh token", "section_id": 71}])),
    );
    source.cases.insert(
        (1, Some(8)),
        from_json(json!([{"id": 800, "title": "Submit form", "section_id": 80}])),
    );

    let target = Arc::new(FakeTarget::default());
    let ctx = context(source, Arc::clone(&target), MigrationSettings::default());

    let stats = run_migration(&ctx).await.unwrap();

    target.written(|w| {
        let suites: HashMap<&str, (i64, Option<i64>)> = w
            .suites
            .iter()
            .map(|(_, id, s)| (s.title.as_str(), (*id, s.parent_id)))
            .collect();
        assert_eq!(suites.len(), 3);
        assert_eq!(suites["Forms"].1, Some(suites["UI"].0));

        let case_suites: HashMap<i64, Option<i64>> = w
            .cases
            .iter()
            .flat_map(|(_, cases)| cases.iter().map(|c| (c.id, c.suite_id)))
            .collect();
        assert_eq!(case_suites[&700], Some(suites["API"].0));
        assert_eq!(case_suites[&800], Some(suites["Forms"].0));
    });
    assert_eq!(stats.failures.get("suites"), Some(&1));
}

#[tokio::test]
async fn section_ids_never_shadow_synthetic_suites() {
    let mut source = FakeSource {
        projects: vec![project(1, "Multi", 3)],
        ..FakeSource::default()
    };
    source.suites.insert(
        1,
        from_json(json!([{"id": 7, "name": "API"}, {"id": 8, "name": "UI"}])),
    );
    source
        .sections
        .insert((1, Some(7)), vec![section(1_000_000, "Deep", None)]);
    source
        .sections
        .insert((1, Some(8)), vec![section(1_000_001, "Other", None)]);
    source.cases.insert(
        (1, Some(7)),
        from_json(json!([
            {"id": 700, "title": "In section", "section_id": 1_000_000},
            {"id": 701, "title": "Loose"},
        ])),
    );

    let target = Arc::new(FakeTarget::default());
    let ctx = context(source, Arc::clone(&target), MigrationSettings::default());

    run_migration(&ctx).await.unwrap();

    target.written(|w| {
        let suites: HashMap<&str, (i64, Option<i64>)> = w
            .suites
            .iter()
            .map(|(_, id, s)| (s.title.as_str(), (*id, s.parent_id)))
            .collect();
        assert_eq!(suites["Deep"].1, Some(suites["API"].0));
        assert_eq!(suites["Other"].1, Some(suites["UI"].0));

        let case_suites: HashMap<i64, Option<i64>> = w
            .cases
            .iter()
            .flat_map(|(_, cases)| cases.iter().map(|c| (c.id, c.suite_id)))
            .collect();
        assert_eq!(case_suites[&700], Some(suites["Deep"].0));
        assert_eq!(case_suites[&701], Some(suites["API"].0));
    });
}

#[tokio::test]
async fn missing_users_are_provisioned_into_the_migration_group() {
    let user = |id, name: &str, email: &str, is_active| SourceUser {
        id,
        name: name.into(),
        email: email.into(),
        is_active,
        role: Some("Tester".into()),
    };
    let source = FakeSource {
        projects: vec![project(1, "Alpha Test", 1)],
        users: vec![
            user(5, "Ann", "ann@example.com", true),
            user(6, "Bob Stone", "bob@example.com", true),
            user(7, "Cid", "cid@example.com", false),
            user(8, "Dee", "dee@example.com", true),
        ],
        ..FakeSource::default()
    };
    let target = Arc::new(FakeTarget {
        authors: vec![TargetAuthor {
            id: 50,
            email: Some("ANN@example.com".into()),
        }],
        failing_users: vec!["dee@example.com".into()],
        ..FakeTarget::default()
    });
    let settings = MigrationSettings {
        create_users: true,
        ..MigrationSettings::default()
    };
    let ctx = context(source, Arc::clone(&target), settings).with_directory(target.clone());

    let stats = run_migration(&ctx).await.unwrap();

    let (group_id, bob_author) = target.written(|w| {
        assert_eq!(w.groups, vec!["TestRail Migration".to_string()]);
        assert_eq!(w.directory_users.len(), 1);
        let (author, bob) = &w.directory_users[0];
        assert_eq!(bob.email, "bob@example.com");
        assert_eq!(bob.given_name, "Bob");
        assert_eq!(bob.family_name, "Stone");
        assert_eq!(bob.role.as_deref(), Some("Tester"));

        assert_eq!(w.memberships.len(), 1);
        assert_eq!(w.memberships[0].1, format!("user-{author}"));
        assert_eq!(w.projects[0].group.as_deref(), Some(w.memberships[0].0.as_str()));
        (w.memberships[0].0.clone(), *author)
    });

    assert_eq!(ctx.users_group.get(), Some(&group_id));
    assert_eq!(ctx.users.get(&5), Some(50));
    assert_eq!(ctx.users.get(&6), Some(bob_author));
    assert_eq!(ctx.author_of(Some(8)), 1);
    assert_eq!(stats.users.target, 2);
    assert_eq!(stats.failures.get("users"), Some(&1));
}

#[tokio::test]
async fn users_are_only_matched_when_provisioning_is_off() {
    let source = FakeSource {
        users: vec![SourceUser {
            id: 6,
            name: "Bob Stone".into(),
            email: "bob@example.com".into(),
            is_active: true,
            role: None,
        }],
        ..FakeSource::default()
    };
    let target = Arc::new(FakeTarget::default());
    let ctx = context(source, Arc::clone(&target), MigrationSettings::default()).with_directory(target.clone());

    run_migration(&ctx).await.unwrap();

    target.written(|w| {
        assert!(w.groups.is_empty());
        assert!(w.directory_users.is_empty());
    });
    assert!(ctx.users_group.get().is_none());
    assert_eq!(ctx.author_of(Some(6)), 1);
}
