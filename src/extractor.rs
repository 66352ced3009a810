use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;

use crate::cancel::NeverCancel;
use crate::delay_manager::{DelayCategory, DelayPolicy, DelaySpec};
use crate::error::{LocateError, SessionError};
use crate::profile::{
    BasicInfo, CertificationEntry, EducationEntry, ExperienceEntry, LanguageEntry, ProfileRecord, SectionName,
    SectionPayload,
};
use crate::session::{NavigationDriver, PageHandle, SectionLocator, RawSection};

const SCROLL_STEP_PX: i64 = 800;
const MAX_SCROLL_STEPS: usize = 12;

/// Result of extracting one section.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionOutcome {
    Present(SectionPayload),
    Absent,
    Failure(String),
}

/// Turns raw section text into typed payloads.
pub struct Extractor {
    whitespace_regex: Regex,
    date_range_regex: Regex,
    issued_regex: Regex,
    noise_regex: Regex,
}

impl Extractor {
    pub fn new() -> Self {
        Extractor {
            whitespace_regex: Regex::new(r"\s+").unwrap(),
            // "Jan 2020 - Present", "2016 – 2020", "Mar. 2019 - Aug 2021 · 2 yrs 5 mos"
            date_range_regex: Regex::new(
                r"(?i)^((jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+)?\d{4}\s*[-–—]\s*(present|((jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+)?\d{4})",
            )
            .unwrap(),
            issued_regex: Regex::new(r"(?i)^issued\s+(.+)$").unwrap(),
            // UI chrome that leaks into section text
            noise_regex: Regex::new(r"(?i)^((…|\.\.\.)?\s*see more|show all.*|\d+\s+endorsements?|endorsed by .*)$").unwrap(),
        }
    }

    pub fn extract(&self, section: SectionName, raw: &RawSection) -> SectionOutcome {
        match section {
            SectionName::BasicInfo => self.basic_info(raw),
            SectionName::About => self.cleaned(raw, |blocks| self.about(blocks)),
            SectionName::Experience => self.cleaned(raw, |blocks| {
                Self::list(blocks, |b| self.experience_entry(b), SectionPayload::Experience)
            }),
            SectionName::Education => self.cleaned(raw, |blocks| {
                Self::list(blocks, |b| self.education_entry(b), SectionPayload::Education)
            }),
            SectionName::Skills => self.cleaned(raw, |blocks| self.skills(blocks)),
            SectionName::Certifications => self.cleaned(raw, |blocks| {
                Self::list(blocks, |b| self.certification_entry(b), SectionPayload::Certifications)
            }),
            SectionName::Languages => self.cleaned(raw, |blocks| {
                Self::list(blocks, |b| self.language_entry(b), SectionPayload::Languages)
            }),
        }
    }

    /// Runs `parse` over the cleaned blocks; nothing left after cleaning is `Absent`.
    fn cleaned(&self, raw: &RawSection, parse: impl FnOnce(&[Vec<String>]) -> SectionOutcome) -> SectionOutcome {
        let blocks = self.clean_blocks(raw);
        if blocks.is_empty() {
            return SectionOutcome::Absent;
        }
        parse(blocks.as_slice())
    }

    /// Normalises whitespace, drops UI noise and blank lines, collapses the
    /// repeated lines that visually-hidden duplicates produce, and drops blocks
    /// left empty.
    fn clean_blocks(&self, raw: &RawSection) -> Vec<Vec<String>> {
        raw.blocks
            .iter()
            .map(|block| {
                let mut lines: Vec<String> = Vec::new();
                for line in block {
                    let line = self.whitespace_regex.replace_all(line.trim(), " ").to_string();
                    if line.is_empty() || self.noise_regex.is_match(&line) {
                        continue;
                    }
                    if lines.last() != Some(&line) {
                        lines.push(line);
                    }
                }
                lines
            })
            .filter(|lines| !lines.is_empty())
            .collect()
    }

    fn list<T>(
        blocks: &[Vec<String>],
        parse: impl Fn(&[String]) -> Option<T>,
        wrap: fn(Vec<T>) -> SectionPayload,
    ) -> SectionOutcome {
        let entries: Vec<T> = blocks.iter().filter_map(|b| parse(b.as_slice())).collect();
        if entries.is_empty() {
            return SectionOutcome::Failure(format!("{} blocks found but none could be parsed", blocks.len()));
        }
        SectionOutcome::Present(wrap(entries))
    }

    /// Lines are positional (name, headline, location); a blank line keeps
    /// its slot so a missing headline does not shift the location up.
    fn basic_info(&self, raw: &RawSection) -> SectionOutcome {
        let field = |i: usize| {
            raw.blocks
                .first()
                .and_then(|lines| lines.get(i))
                .map(|line| self.whitespace_regex.replace_all(line.trim(), " ").to_string())
                .filter(|line| !line.is_empty())
        };
        let info = BasicInfo {
            name: field(0),
            headline: field(1),
            location: field(2),
        };
        if info.name.is_none() && info.headline.is_none() && info.location.is_none() {
            return SectionOutcome::Absent;
        }
        SectionOutcome::Present(SectionPayload::BasicInfo(info))
    }

    fn about(&self, blocks: &[Vec<String>]) -> SectionOutcome {
        let text = blocks.iter().flatten().cloned().collect::<Vec<_>>().join("\n");
        SectionOutcome::Present(SectionPayload::About(text))
    }

    fn skills(&self, blocks: &[Vec<String>]) -> SectionOutcome {
        let mut skills: Vec<String> = Vec::new();
        for block in blocks {
            if let Some(skill) = block.first() {
                if !skills.contains(skill) {
                    skills.push(skill.clone());
                }
            }
        }
        SectionOutcome::Present(SectionPayload::Skills(skills))
    }

    /// Splits a block into its first date-looking line and the remaining lines.
    fn split_dates<'b>(&self, block: &'b [String]) -> (Option<String>, Vec<&'b String>) {
        let mut dates = None;
        let mut rest = Vec::new();
        for line in block {
            if dates.is_none() && self.date_range_regex.is_match(line) {
                dates = Some(line.clone());
            } else {
                rest.push(line);
            }
        }
        (dates, rest)
    }

    fn experience_entry(&self, block: &[String]) -> Option<ExperienceEntry> {
        let (dates, rest) = self.split_dates(block);
        let mut rest = rest.into_iter();
        let title = rest.next().cloned()?;
        let company = rest.next().cloned();
        let description: Vec<&str> = rest.map(String::as_str).collect();
        Some(ExperienceEntry {
            title: Some(title),
            company,
            dates,
            description: if description.is_empty() { None } else { Some(description.join(" ")) },
        })
    }

    fn education_entry(&self, block: &[String]) -> Option<EducationEntry> {
        let (dates, rest) = self.split_dates(block);
        let mut rest = rest.into_iter();
        let school = rest.next().cloned()?;
        Some(EducationEntry {
            school: Some(school),
            degree: rest.next().cloned(),
            dates,
        })
    }

    fn certification_entry(&self, block: &[String]) -> Option<CertificationEntry> {
        let mut issued = None;
        let mut rest = Vec::new();
        for line in block {
            if issued.is_none() {
                if let Some(caps) = self.issued_regex.captures(line) {
                    issued = caps.get(1).map(|m| m.as_str().to_string());
                    continue;
                }
            }
            rest.push(line);
        }
        let mut rest = rest.into_iter();
        let name = rest.next().cloned()?;
        Some(CertificationEntry {
            name: Some(name),
            issuer: rest.next().cloned(),
            issued,
        })
    }

    fn language_entry(&self, block: &[String]) -> Option<LanguageEntry> {
        let name = block.first().cloned()?;
        Some(LanguageEntry {
            name: Some(name),
            proficiency: block.get(1).cloned(),
        })
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-level failure raised while extracting one target. Carries whatever
/// had been collected so far, for logging.
#[derive(Debug)]
pub struct PipelineAbort {
    pub partial: ProfileRecord,
    pub error: SessionError,
}

/// Runs every section extractor for one target, in a fixed order, isolating
/// per-section failures from each other.
pub struct ExtractionPipeline {
    extractor: Extractor,
    delays: DelayPolicy,
}

impl ExtractionPipeline {
    pub fn new(delays: &DelaySpec) -> Self {
        ExtractionPipeline {
            extractor: Extractor::new(),
            delays: DelayPolicy::new(delays),
        }
    }

    pub fn extract(
        &self,
        driver: &mut dyn NavigationDriver,
        locator: &dyn SectionLocator,
        target_id: &str,
        scraped_at: DateTime<Utc>,
    ) -> Result<ProfileRecord, PipelineAbort> {
        let mut record = ProfileRecord::empty(target_id, scraped_at);
        info!("Scraping profile: {}", target_id);

        let mut page = match driver.open(target_id) {
            Ok(page) => page,
            Err(error) => return Err(PipelineAbort { partial: record, error }),
        };
        // Page-level pacing never stops early on cancellation: the current
        // target always finishes.
        self.delays.pause(DelayCategory::Interaction, &NeverCancel);

        if let Err(error) = self.load_everything(driver, &mut page) {
            return Err(PipelineAbort { partial: record, error });
        }

        for section in SectionName::ALL {
            if let Some(selector) = locator.expander(section) {
                match driver.click_element(&mut page, selector) {
                    Ok(true) => {
                        debug!("Expanded {} section for {}", section, target_id);
                        self.delays.pause(DelayCategory::Interaction, &NeverCancel);
                    }
                    Ok(false) => {}
                    Err(error) => return Err(PipelineAbort { partial: record, error }),
                }
            }

            let outcome = match locator.locate(&page, section) {
                Ok(Some(raw)) if raw.is_empty() => SectionOutcome::Absent,
                Ok(Some(raw)) => self.extractor.extract(section, &raw),
                Ok(None) => SectionOutcome::Absent,
                Err(LocateError::Layout(reason)) => SectionOutcome::Failure(reason),
                Err(LocateError::Session(error)) => return Err(PipelineAbort { partial: record, error }),
            };

            match outcome {
                SectionOutcome::Present(payload) => {
                    debug!("Extracted {} ({} entries) for {}", section, payload.len(), target_id);
                    record.set(payload);
                }
                SectionOutcome::Absent => info!("No {} section found for {}", section, target_id),
                SectionOutcome::Failure(reason) => {
                    warn!("Extraction of {} failed for {}: {}", section, target_id, reason)
                }
            }
        }

        info!(
            "Extracted profile data for: {} ({}/{} sections)",
            record.display_name(),
            record.present_sections().len(),
            SectionName::ALL.len()
        );
        Ok(record)
    }

    /// Scrolls until the driver reports nothing more to load, pacing each step.
    fn load_everything(&self, driver: &mut dyn NavigationDriver, page: &mut PageHandle) -> Result<(), SessionError> {
        for _ in 0..MAX_SCROLL_STEPS {
            if !driver.scroll_by(page, SCROLL_STEP_PX)? {
                return Ok(());
            }
            self.delays.pause(DelayCategory::Scroll, &NeverCancel);
        }
        debug!("Stopped scrolling {} after {} steps", page.target_id, MAX_SCROLL_STEPS);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn experience_blocks_split_title_company_dates() {
        let extractor = Extractor::new();
        let raw = RawSection::from_blocks(vec![
            block(&["Staff Engineer", "Staff Engineer", "Acme Corp · Full-time", "Jan 2020 - Present · 4 yrs", "Built the  billing   pipeline."]),
            block(&["   "]),
            block(&["Intern", "2016 – 2017"]),
        ]);

        let SectionOutcome::Present(SectionPayload::Experience(entries)) = extractor.extract(SectionName::Experience, &raw) else {
            panic!("expected experience entries");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("Staff Engineer"));
        assert_eq!(entries[0].company.as_deref(), Some("Acme Corp · Full-time"));
        assert_eq!(entries[0].dates.as_deref(), Some("Jan 2020 - Present · 4 yrs"));
        assert_eq!(entries[0].description.as_deref(), Some("Built the billing pipeline."));
        assert_eq!(entries[1].company, None);
        assert_eq!(entries[1].dates.as_deref(), Some("2016 – 2017"));
    }

    #[test]
    fn skills_are_deduplicated_in_order() {
        let extractor = Extractor::new();
        let raw = RawSection::from_blocks(vec![
            block(&["Rust", "12 endorsements"]),
            block(&["Go"]),
            block(&["Rust"]),
            block(&["Show all 40 skills"]),
        ]);
        assert_eq!(
            extractor.extract(SectionName::Skills, &raw),
            SectionOutcome::Present(SectionPayload::Skills(vec!["Rust".into(), "Go".into()]))
        );
    }

    #[test]
    fn about_drops_see_more_and_empty_is_absent() {
        let extractor = Extractor::new();
        let raw = RawSection::single(["I build things.", "…see more"]);
        assert_eq!(
            extractor.extract(SectionName::About, &raw),
            SectionOutcome::Present(SectionPayload::About("I build things.".into()))
        );
        assert_eq!(extractor.extract(SectionName::About, &RawSection::single(["  "])), SectionOutcome::Absent);
    }

    #[test]
    fn certifications_pick_up_issue_date() {
        let extractor = Extractor::new();
        let raw = RawSection::from_blocks(vec![block(&["CKA", "Linux Foundation", "Issued Mar 2023"])]);
        let SectionOutcome::Present(SectionPayload::Certifications(certs)) = extractor.extract(SectionName::Certifications, &raw) else {
            panic!("expected certifications");
        };
        assert_eq!(certs[0].name.as_deref(), Some("CKA"));
        assert_eq!(certs[0].issuer.as_deref(), Some("Linux Foundation"));
        assert_eq!(certs[0].issued.as_deref(), Some("Mar 2023"));
    }

    #[test]
    fn basic_info_and_languages() {
        let extractor = Extractor::new();
        let raw = RawSection::single(["Ada Lovelace", "Analyst", "London"]);
        assert_eq!(
            extractor.extract(SectionName::BasicInfo, &raw),
            SectionOutcome::Present(SectionPayload::BasicInfo(BasicInfo {
                name: Some("Ada Lovelace".into()),
                headline: Some("Analyst".into()),
                location: Some("London".into()),
            }))
        );

        let partial = RawSection::single(["Grace Hopper", "", "Arlington"]);
        let SectionOutcome::Present(SectionPayload::BasicInfo(info)) = extractor.extract(SectionName::BasicInfo, &partial) else {
            panic!("expected basic info");
        };
        assert_eq!(info.headline, None);
        assert_eq!(info.location.as_deref(), Some("Arlington"));

        let langs = RawSection::from_blocks(vec![block(&["French", "Native or bilingual proficiency"]), block(&["German"])]);
        let SectionOutcome::Present(SectionPayload::Languages(langs)) = extractor.extract(SectionName::Languages, &langs) else {
            panic!("expected languages");
        };
        assert_eq!(langs[1].proficiency, None);
    }

    struct StaticDriver;

    impl NavigationDriver for StaticDriver {
        fn open(&mut self, target_id: &str) -> Result<PageHandle, SessionError> {
            Ok(PageHandle { target_id: target_id.into(), url: target_id.into(), content: String::new() })
        }
        fn scroll_by(&mut self, _: &mut PageHandle, _: i64) -> Result<bool, SessionError> {
            Ok(false)
        }
        fn click_element(&mut self, _: &mut PageHandle, _: &str) -> Result<bool, SessionError> {
            Ok(false)
        }
    }

    /// Finds every section, but only name and about carry any text.
    struct BlankLocator;

    impl SectionLocator for BlankLocator {
        fn locate(&self, _: &PageHandle, section: SectionName) -> Result<Option<RawSection>, LocateError> {
            Ok(Some(match section {
                SectionName::BasicInfo => RawSection::single(["Ada Lovelace"]),
                SectionName::About => RawSection::single(["Poetical science."]),
                _ => RawSection::from_blocks(vec![block(&["  ", ""]), block(&[])]),
            }))
        }
    }

    #[test]
    fn blank_sections_found_on_the_page_are_absent() {
        let pipeline = ExtractionPipeline::new(&DelaySpec::immediate());
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 6, 12, 14, 0, 0).unwrap();
        let record = pipeline.extract(&mut StaticDriver, &BlankLocator, "ada", at).unwrap();
        assert_eq!(record.present_sections(), vec![SectionName::BasicInfo, SectionName::About]);
        assert_eq!(record.experience, None);
        assert_eq!(record.languages, None);
    }

    #[test]
    fn dates_only_block_is_a_layout_failure() {
        let extractor = Extractor::new();
        let raw = RawSection::from_blocks(vec![block(&["2019 - 2020"])]);
        assert!(matches!(extractor.extract(SectionName::Education, &raw), SectionOutcome::Failure(_)));
    }
}
