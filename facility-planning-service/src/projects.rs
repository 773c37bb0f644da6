//! Whole-value update operations over the user → project → report tree.
//!
//! Every mutation reads the old value and produces a new one; callers
//! replace their held references. Nothing here pushes into a shared
//! array in place, which keeps the active-project view and the entry
//! inside `user.projects` from aliasing each other.

use crate::agents::types::ParsedReport;
use crate::models::{AnalysisHistoryEntry, HospitalReport, Placement, User, UserProject, ids};

/// Most recent snapshots kept per project.
pub const HISTORY_CAP: usize = 20;

/// Append a project, bumping the id on the rare same-millisecond collision.
pub fn create_project(user: &User, mut project: UserProject) -> (User, UserProject) {
    let base = project.id.clone();
    let mut n = 1;
    while user.projects.iter().any(|p| p.id == project.id) {
        project.id = format!("{base}-{n}");
        n += 1;
    }
    let mut next = user.clone();
    next.projects.push(project.clone());
    (next, project)
}

pub fn delete_project(user: &User, project_id: &str) -> User {
    let mut next = user.clone();
    next.projects.retain(|p| p.id != project_id);
    next
}

/// Replace the entry matching `project.id`.
pub fn upsert_project(user: &User, project: &UserProject) -> User {
    let mut next = user.clone();
    match next.projects.iter_mut().find(|p| p.id == project.id) {
        Some(entry) => *entry = project.clone(),
        None => next.projects.push(project.clone()),
    }
    next
}

pub fn append_report(project: &UserProject, report: HospitalReport) -> UserProject {
    let mut next = project.clone();
    next.reports.push(report);
    next
}

pub fn append_history(project: &UserProject, entry: AnalysisHistoryEntry) -> UserProject {
    let mut next = project.clone();
    next.analysis_history.push(entry);
    if next.analysis_history.len() > HISTORY_CAP {
        let overflow = next.analysis_history.len() - HISTORY_CAP;
        next.analysis_history.drain(0..overflow);
    }
    next
}

pub fn set_placements(project: &UserProject, placements: Vec<Placement>) -> UserProject {
    let mut next = project.clone();
    next.placements = placements;
    next
}

/// Tie-break for the operator's own entry during project creation: when a
/// discovered facility's name contains the parsed facility name
/// (case-insensitive), the discovered coordinates and region are spliced
/// into the parsed entry instead of creating a duplicate. Returns the id
/// of the absorbed discovery so the caller can drop it from the list.
pub fn splice_discovery(parsed: &mut ParsedReport, discovered: &[HospitalReport]) -> Option<String> {
    let name = parsed.facility_name.as_ref()?;
    let needle = name.to_lowercase();
    let found = discovered
        .iter()
        .find(|r| r.facility_name.to_lowercase().contains(&needle))?;
    parsed.coordinates = found.coordinates;
    parsed.region = Some(found.region.clone());
    Some(found.id.clone())
}

/// Fold freshly discovered facilities into a project. A discovery whose
/// name matches a manually entered report enriches that entry in the new
/// project value (discovered placement wins); a name already present is
/// skipped; everything else is appended. Returns the new project and the
/// number of appended reports.
pub fn merge_discovery(
    project: &UserProject,
    discovered: Vec<HospitalReport>,
) -> (UserProject, usize) {
    let mut next = project.clone();
    let mut added = 0;
    for found in discovered {
        let found_name = found.facility_name.to_lowercase();
        if let Some(entry) = next.reports.iter_mut().find(|r| {
            ids::is_manual(&r.id) && found_name.contains(&r.facility_name.to_lowercase())
        }) {
            entry.coordinates = found.coordinates.or(entry.coordinates);
            if !found.region.is_empty() {
                entry.region = found.region.clone();
            }
            continue;
        }
        if next
            .reports
            .iter()
            .any(|r| r.facility_name.eq_ignore_ascii_case(&found.facility_name))
        {
            continue;
        }
        next.reports.push(found);
        added += 1;
    }
    (next, added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::today;

    fn report(id: &str, name: &str, region: &str) -> HospitalReport {
        HospitalReport {
            id: id.to_string(),
            facility_name: name.to_string(),
            region: region.to_string(),
            report_date: today(),
            unstructured_text: String::new(),
            coordinates: None,
            anomalies: Vec::new(),
            extracted_data: None,
        }
    }

    fn user_with_two_projects() -> User {
        let mut user = User::new("Ama", "ama@x.com", "secret1");
        let (next, _) = create_project(
            &user,
            UserProject::new("P1", Vec::new(), Vec::new(), None),
        );
        user = next;
        let (next, _) = create_project(
            &user,
            UserProject::new("P2", Vec::new(), Vec::new(), None),
        );
        next
    }

    #[test]
    fn appending_to_one_project_leaves_the_other_untouched() {
        let user = user_with_two_projects();
        let p1 = user.projects[0].clone();
        let p2_before = user.projects[1].clone();

        let p1 = append_report(&p1, report("manual-1", "Wa Hospital", "Upper West"));
        let user = upsert_project(&user, &p1);

        assert_eq!(user.projects[0].reports.len(), 1);
        assert_eq!(user.projects[1].reports.len(), 0);
        assert_eq!(user.projects[1], p2_before);
    }

    #[test]
    fn same_millisecond_ids_are_disambiguated() {
        let user = User::new("Ama", "ama@x.com", "secret1");
        let mut first = UserProject::new("P1", Vec::new(), Vec::new(), None);
        first.id = "p123".to_string();
        let mut second = UserProject::new("P2", Vec::new(), Vec::new(), None);
        second.id = "p123".to_string();

        let (user, first) = create_project(&user, first);
        let (user, second) = create_project(&user, second);
        assert_ne!(first.id, second.id);
        assert_eq!(user.projects.len(), 2);
    }

    #[test]
    fn delete_removes_only_the_named_project() {
        let user = user_with_two_projects();
        let doomed = user.projects[0].id.clone();
        let survivor = user.projects[1].id.clone();

        let user = delete_project(&user, &doomed);
        assert_eq!(user.projects.len(), 1);
        assert_eq!(user.projects[0].id, survivor);
    }

    #[test]
    fn history_is_capped_to_the_most_recent_entries() {
        let mut project = UserProject::new("P1", Vec::new(), Vec::new(), None);
        for i in 0..(HISTORY_CAP + 5) {
            project = append_history(
                &project,
                AnalysisHistoryEntry::new(format!("plan {i}"), Vec::new()),
            );
        }
        assert_eq!(project.analysis_history.len(), HISTORY_CAP);
        assert_eq!(project.analysis_history[0].plan, "plan 5");
        assert_eq!(
            project.analysis_history.last().unwrap().plan,
            format!("plan {}", HISTORY_CAP + 4)
        );
    }

    #[test]
    fn splice_prefers_discovered_placement() {
        let mut parsed = ParsedReport {
            facility_name: Some("Wa Hospital".to_string()),
            ..Default::default()
        };
        let mut found = report("web-1", "Wa Hospital Regional Center", "Upper West");
        found.coordinates = Some((10.06, -2.5));

        let matched = splice_discovery(&mut parsed, std::slice::from_ref(&found));
        assert_eq!(matched.as_deref(), Some("web-1"));
        assert_eq!(parsed.coordinates, Some((10.06, -2.5)));
        assert_eq!(parsed.region.as_deref(), Some("Upper West"));
    }

    #[test]
    fn merge_enriches_manual_entries_and_skips_duplicates() {
        let mut manual = report("manual-1", "Wa Hospital", "Unknown");
        manual.coordinates = None;
        let existing_web = report("web-0", "Tamale Regional Hospital", "Northern");
        let project = UserProject::new(
            "P1",
            Vec::new(),
            vec![manual, existing_web],
            None,
        );

        let mut enriching = report("web-1", "Wa Hospital Regional Center", "Upper West");
        enriching.coordinates = Some((10.06, -2.5));
        let duplicate = report("web-2", "tamale regional hospital", "Northern");
        let fresh = report("web-3", "Bolgatanga Central", "Upper East");

        let (merged, added) = merge_discovery(&project, vec![enriching, duplicate, fresh]);
        assert_eq!(added, 1);
        assert_eq!(merged.reports.len(), 3);
        assert_eq!(merged.reports[0].coordinates, Some((10.06, -2.5)));
        assert_eq!(merged.reports[0].region, "Upper West");
        assert_eq!(merged.reports[2].facility_name, "Bolgatanga Central");
    }
}
