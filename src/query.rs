use std::str::FromStr;

use crate::api::ApiRequest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VaccinatedFilter {
    #[default]
    Any,
    Vaccinated,
    NotVaccinated,
}

impl VaccinatedFilter {
    pub fn as_query(&self) -> &'static str {
        match self {
            VaccinatedFilter::Any => "",
            VaccinatedFilter::Vaccinated => "true",
            VaccinatedFilter::NotVaccinated => "false",
        }
    }
}

impl FromStr for VaccinatedFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "any" | "all" => Ok(VaccinatedFilter::Any),
            "true" | "yes" => Ok(VaccinatedFilter::Vaccinated),
            "false" | "no" => Ok(VaccinatedFilter::NotVaccinated),
            other => Err(format!("unknown vaccinated filter '{other}' (use any, yes or no)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentFilters {
    pub name: String,
    pub class: String,
    pub vaccinated: VaccinatedFilter,
    pub drive_id: Option<i64>,
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFilters {
    pub vaccine_name: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ReportFilters {
    fn default() -> Self {
        Self {
            vaccine_name: None,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// A request derived from the complete filter set at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub seq: u64,
    pub request: ApiRequest,
}

/// Hands out increasing sequence numbers; only the newest one is current.
#[derive(Debug, Default)]
pub struct Sequencer {
    issued: u64,
}

impl Sequencer {
    pub fn next(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.issued
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Filter state of the student list.
#[derive(Debug, Default)]
pub struct StudentQuery {
    filters: StudentFilters,
    seq: Sequencer,
}

impl StudentQuery {
    pub fn new(filters: StudentFilters) -> Self {
        Self {
            filters,
            seq: Sequencer::default(),
        }
    }

    pub fn selected_drive(&self) -> Option<i64> {
        self.filters.drive_id
    }

    /// Unconditional fetch of the current filter set (mount, search, read-back).
    pub fn refresh(&mut self) -> FetchTicket {
        FetchTicket {
            seq: self.seq.next(),
            request: ApiRequest::list_students(&self.filters),
        }
    }

    fn issue_if(&mut self, changed: bool) -> Option<FetchTicket> {
        changed.then(|| self.refresh())
    }

    pub fn set_name(&mut self, name: &str) -> Option<FetchTicket> {
        let changed = replace(&mut self.filters.name, name.to_string());
        self.issue_if(changed)
    }

    pub fn set_class(&mut self, class: &str) -> Option<FetchTicket> {
        let changed = replace(&mut self.filters.class, class.to_string());
        self.issue_if(changed)
    }

    pub fn set_vaccinated(&mut self, vaccinated: VaccinatedFilter) -> Option<FetchTicket> {
        let changed = replace(&mut self.filters.vaccinated, vaccinated);
        self.issue_if(changed)
    }

    pub fn select_drive(&mut self, drive_id: Option<i64>) -> Option<FetchTicket> {
        let changed = replace(&mut self.filters.drive_id, drive_id);
        self.issue_if(changed)
    }

    pub fn accepts(&self, seq: u64) -> bool {
        self.seq.is_current(seq)
    }
}

/// Filter and paging state of the vaccination report.
#[derive(Debug)]
pub struct ReportQuery {
    filters: ReportFilters,
    total_pages: u32,
    seq: Sequencer,
}

impl Default for ReportQuery {
    fn default() -> Self {
        Self::new(ReportFilters::default())
    }
}

impl ReportQuery {
    pub fn new(filters: ReportFilters) -> Self {
        Self {
            filters,
            total_pages: 1,
            seq: Sequencer::default(),
        }
    }

    pub fn filters(&self) -> &ReportFilters {
        &self.filters
    }

    pub fn page(&self) -> u32 {
        self.filters.page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn refresh(&mut self) -> FetchTicket {
        FetchTicket {
            seq: self.seq.next(),
            request: ApiRequest::report(&self.filters),
        }
    }

    /// Any non-page change starts over from the first page.
    fn filter_changed(&mut self, changed: bool) -> Option<FetchTicket> {
        if !changed {
            return None;
        }
        self.filters.page = 1;
        Some(self.refresh())
    }

    pub fn set_vaccine_name(&mut self, vaccine_name: Option<&str>) -> Option<FetchTicket> {
        let value = vaccine_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let changed = replace(&mut self.filters.vaccine_name, value);
        self.filter_changed(changed)
    }

    pub fn set_limit(&mut self, limit: u32) -> Option<FetchTicket> {
        let changed = replace(&mut self.filters.limit, limit.max(1));
        self.filter_changed(changed)
    }

    /// Pages outside `[1, total_pages]` are ignored without touching state.
    pub fn go_to_page(&mut self, page: u32) -> Option<FetchTicket> {
        if page < 1 || page > self.total_pages {
            return None;
        }
        let changed = replace(&mut self.filters.page, page);
        changed.then(|| self.refresh())
    }

    pub fn next_page(&mut self) -> Option<FetchTicket> {
        self.go_to_page(self.filters.page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> Option<FetchTicket> {
        self.go_to_page(self.filters.page.saturating_sub(1))
    }

    pub fn accepts(&self, seq: u64) -> bool {
        self.seq.is_current(seq)
    }

    /// Records the server's page count and echoed page if `seq` is still current.
    ///
    /// An echoed page inside `[1, total_pages]` wins over the requested one.
    pub fn accept(&mut self, seq: u64, total_pages: u32, echoed_page: Option<u32>) -> bool {
        if !self.accepts(seq) {
            return false;
        }
        self.total_pages = total_pages;
        if let Some(page) = echoed_page.filter(|page| (1..=total_pages).contains(page)) {
            if page != self.filters.page {
                log::warn!("server answered page {page} for page {}", self.filters.page);
                self.filters.page = page;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_value(ticket: &FetchTicket, key: &str) -> String {
        ticket
            .request
            .query
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    #[test]
    fn each_student_filter_change_issues_one_ticket_with_all_fields() {
        let mut query = StudentQuery::default();
        query.set_name("ava").expect("name change");
        query.set_class("Grade 1").expect("class change");
        let ticket = query
            .set_vaccinated(VaccinatedFilter::Vaccinated)
            .expect("vaccinated change");

        assert_eq!(query_value(&ticket, "name"), "ava");
        assert_eq!(query_value(&ticket, "studentClass"), "Grade 1");
        assert_eq!(query_value(&ticket, "vaccinated"), "true");
        assert_eq!(query_value(&ticket, "drive_id"), "");
        assert_eq!(ticket.seq, 3);
    }

    #[test]
    fn unchanged_value_issues_nothing() {
        let mut query = StudentQuery::default();
        assert!(query.set_name("").is_none());
        assert!(query.select_drive(None).is_none());
        query.select_drive(Some(4)).expect("drive selected");
        assert!(query.select_drive(Some(4)).is_none());
    }

    #[test]
    fn only_latest_ticket_is_accepted() {
        let mut query = StudentQuery::default();
        let first = query.set_name("a").unwrap();
        let second = query.set_name("ab").unwrap();
        assert!(!query.accepts(first.seq));
        assert!(query.accepts(second.seq));
    }

    #[test]
    fn filter_change_resets_page_to_one() {
        let mut query = ReportQuery::default();
        let ticket = query.refresh();
        assert!(query.accept(ticket.seq, 5, None));
        query.go_to_page(4).expect("page in range");
        assert_eq!(query.page(), 4);

        let ticket = query.set_vaccine_name(Some("MMR")).expect("vaccine change");
        assert_eq!(query.page(), 1);
        assert_eq!(query_value(&ticket, "page"), "1");
        assert_eq!(query_value(&ticket, "vaccine_name"), "MMR");

        query.accept(ticket.seq, 5, None);
        query.go_to_page(2).unwrap();
        query.set_limit(25).expect("limit change");
        assert_eq!(query.page(), 1);
    }

    #[test]
    fn page_outside_range_is_ignored() {
        let mut query = ReportQuery::default();
        let ticket = query.refresh();
        query.accept(ticket.seq, 2, None);

        assert!(query.go_to_page(3).is_none());
        assert!(query.go_to_page(0).is_none());
        assert!(query.previous_page().is_none());
        assert_eq!(query.page(), 1);

        let ticket = query.next_page().expect("page 2 exists");
        assert_eq!(query_value(&ticket, "page"), "2");
        assert!(query.next_page().is_none());
        assert_eq!(query.page(), 2);
    }

    #[test]
    fn stale_report_result_does_not_update_total_pages() {
        let mut query = ReportQuery::default();
        let stale = query.refresh();
        let fresh = query.set_vaccine_name(Some("Polio")).unwrap();
        assert!(!query.accept(stale.seq, 9, None));
        assert_eq!(query.total_pages(), 1);
        assert!(query.accept(fresh.seq, 3, None));
        assert_eq!(query.total_pages(), 3);
    }

    #[test]
    fn echoed_page_in_range_replaces_requested_page() {
        let mut query = ReportQuery::default();
        let ticket = query.refresh();
        query.accept(ticket.seq, 4, Some(1));

        let ticket = query.go_to_page(3).unwrap();
        assert!(query.accept(ticket.seq, 4, Some(2)));
        assert_eq!(query.page(), 2);

        let ticket = query.go_to_page(4).unwrap();
        assert!(query.accept(ticket.seq, 4, Some(9)));
        assert_eq!(query.page(), 4);
    }

    #[test]
    fn blank_vaccine_name_means_no_filter() {
        let mut query = ReportQuery::default();
        assert!(query.set_vaccine_name(Some("  ")).is_none());
        assert!(query.filters().vaccine_name.is_none());
    }

    #[test]
    fn vaccinated_filter_parses_cli_words() {
        assert_eq!("yes".parse::<VaccinatedFilter>(), Ok(VaccinatedFilter::Vaccinated));
        assert_eq!("false".parse::<VaccinatedFilter>(), Ok(VaccinatedFilter::NotVaccinated));
        assert_eq!("".parse::<VaccinatedFilter>(), Ok(VaccinatedFilter::Any));
        assert!("maybe".parse::<VaccinatedFilter>().is_err());
    }
}
