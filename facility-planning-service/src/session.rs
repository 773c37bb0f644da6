//! Explicit session state, replacing the ambient UI state of a
//! browser-hosted operator console. Bootstrapped from the store at
//! startup, mutated only through orchestrator calls, persisted on every
//! mutation, and cleared on logout.

use serde::{Deserialize, Serialize};

use crate::models::{Citation, HospitalReport, User, UserProject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user: Option<User>,
    pub theme: Theme,
    pub active_project_id: Option<String>,
    /// Active view of the current project's reports, kept in sync with
    /// the matching entry in `user.projects` by every commit.
    pub reports: Vec<HospitalReport>,
    pub plan: Option<String>,
    pub grounding: Vec<Citation>,
}

impl SessionContext {
    pub fn bootstrap(user: Option<User>, theme: Theme) -> Self {
        Self {
            user,
            theme,
            active_project_id: None,
            reports: Vec::new(),
            plan: None,
            grounding: Vec::new(),
        }
    }

    pub fn active_project(&self) -> Option<&UserProject> {
        let id = self.active_project_id.as_deref()?;
        self.user
            .as_ref()?
            .projects
            .iter()
            .find(|p| p.id == id)
    }

    /// Point the derived view at `project`.
    pub fn set_active(&mut self, project: &UserProject) {
        self.active_project_id = Some(project.id.clone());
        self.reports = project.reports.clone();
        self.plan = project.analysis_result.clone();
    }

    pub fn clear_active(&mut self) {
        self.active_project_id = None;
        self.reports.clear();
        self.plan = None;
    }

    /// Logout clears the operator and the active view and returns the
    /// theme to its default.
    pub fn clear_on_logout(&mut self) {
        self.user = None;
        self.clear_active();
        self.grounding.clear();
        self.theme = Theme::Dark;
    }
}

/// Wire-safe projection of the session; passwords never leave the store.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub operator: Option<OperatorView>,
    pub theme: Theme,
    pub projects: Vec<UserProject>,
    pub active_project_id: Option<String>,
    pub reports: Vec<HospitalReport>,
    pub plan: Option<String>,
    pub grounding: Vec<Citation>,
    pub thinking: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperatorView {
    pub name: String,
    pub email: String,
}

impl SessionView {
    pub fn capture(context: &SessionContext, thinking: bool) -> Self {
        Self {
            operator: context.user.as_ref().map(|u| OperatorView {
                name: u.name.clone(),
                email: u.email.clone(),
            }),
            theme: context.theme,
            projects: context
                .user
                .as_ref()
                .map(|u| u.projects.clone())
                .unwrap_or_default(),
            active_project_id: context.active_project_id.clone(),
            reports: context.reports.clone(),
            plan: context.plan.clone(),
            grounding: context.grounding.clone(),
            thinking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProject;

    #[test]
    fn logout_resets_view_and_theme() {
        let mut user = User::new("Ama", "ama@x.com", "secret1");
        let project = UserProject::new("Northern Sweep", Vec::new(), Vec::new(), None);
        user.projects.push(project.clone());

        let mut session = SessionContext::bootstrap(Some(user), Theme::Light);
        session.set_active(&project);
        assert!(session.active_project().is_some());

        session.clear_on_logout();
        assert!(session.user.is_none());
        assert!(session.active_project_id.is_none());
        assert!(session.reports.is_empty());
        assert!(session.plan.is_none());
        assert_eq!(session.theme, Theme::Dark);
    }

    #[test]
    fn session_view_never_carries_passwords() {
        let user = User::new("Ama", "ama@x.com", "secret1");
        let session = SessionContext::bootstrap(Some(user), Theme::Dark);
        let view = SessionView::capture(&session, false);
        let wire = serde_json::to_string(&view).unwrap();
        assert!(!wire.contains("secret1"));
        assert!(wire.contains("ama@x.com"));
    }
}
