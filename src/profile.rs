//! The per-target output record and its section payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed, closed set of sections, in extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionName {
    BasicInfo,
    About,
    Experience,
    Education,
    Skills,
    Certifications,
    Languages,
}

impl SectionName {
    pub const ALL: [SectionName; 7] = [
        SectionName::BasicInfo,
        SectionName::About,
        SectionName::Experience,
        SectionName::Education,
        SectionName::Skills,
        SectionName::Certifications,
        SectionName::Languages,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionName::BasicInfo => "basic_info",
            SectionName::About => "about",
            SectionName::Experience => "experience",
            SectionName::Education => "education",
            SectionName::Skills => "skills",
            SectionName::Certifications => "certifications",
            SectionName::Languages => "languages",
        }
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub name: Option<String>,
    pub headline: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub title: Option<String>,
    pub company: Option<String>,
    pub dates: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub school: Option<String>,
    pub degree: Option<String>,
    pub dates: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificationEntry {
    pub name: Option<String>,
    pub issuer: Option<String>,
    pub issued: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub name: Option<String>,
    pub proficiency: Option<String>,
}

/// Extracted content of one section. One variant per [`SectionName`].
#[derive(Debug, Clone, PartialEq)]
pub enum SectionPayload {
    BasicInfo(BasicInfo),
    About(String),
    Experience(Vec<ExperienceEntry>),
    Education(Vec<EducationEntry>),
    Skills(Vec<String>),
    Certifications(Vec<CertificationEntry>),
    Languages(Vec<LanguageEntry>),
}

impl SectionPayload {
    /// Number of entries, or 1 for single-valued sections.
    pub fn len(&self) -> usize {
        match self {
            SectionPayload::BasicInfo(_) | SectionPayload::About(_) => 1,
            SectionPayload::Experience(v) => v.len(),
            SectionPayload::Education(v) => v.len(),
            SectionPayload::Skills(v) => v.len(),
            SectionPayload::Certifications(v) => v.len(),
            SectionPayload::Languages(v) => v.len(),
        }
    }
}

/// One scraped profile. `None` marks an absent section and serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub target_id: String,
    pub scraped_at: DateTime<Utc>,
    pub basic_info: Option<BasicInfo>,
    pub about: Option<String>,
    pub experience: Option<Vec<ExperienceEntry>>,
    pub education: Option<Vec<EducationEntry>>,
    pub skills: Option<Vec<String>>,
    pub certifications: Option<Vec<CertificationEntry>>,
    pub languages: Option<Vec<LanguageEntry>>,
}

impl ProfileRecord {
    /// A record with every section absent.
    pub fn empty(target_id: impl Into<String>, scraped_at: DateTime<Utc>) -> Self {
        ProfileRecord {
            target_id: target_id.into(),
            scraped_at,
            basic_info: None,
            about: None,
            experience: None,
            education: None,
            skills: None,
            certifications: None,
            languages: None,
        }
    }

    pub fn set(&mut self, payload: SectionPayload) {
        match payload {
            SectionPayload::BasicInfo(v) => self.basic_info = Some(v),
            SectionPayload::About(v) => self.about = Some(v),
            SectionPayload::Experience(v) => self.experience = Some(v),
            SectionPayload::Education(v) => self.education = Some(v),
            SectionPayload::Skills(v) => self.skills = Some(v),
            SectionPayload::Certifications(v) => self.certifications = Some(v),
            SectionPayload::Languages(v) => self.languages = Some(v),
        }
    }

    pub fn has(&self, section: SectionName) -> bool {
        match section {
            SectionName::BasicInfo => self.basic_info.is_some(),
            SectionName::About => self.about.is_some(),
            SectionName::Experience => self.experience.is_some(),
            SectionName::Education => self.education.is_some(),
            SectionName::Skills => self.skills.is_some(),
            SectionName::Certifications => self.certifications.is_some(),
            SectionName::Languages => self.languages.is_some(),
        }
    }

    pub fn present_sections(&self) -> Vec<SectionName> {
        SectionName::ALL.iter().copied().filter(|s| self.has(*s)).collect()
    }

    pub fn is_complete(&self) -> bool {
        SectionName::ALL.iter().all(|s| self.has(*s))
    }

    pub fn display_name(&self) -> &str {
        self.basic_info
            .as_ref()
            .and_then(|b| b.name.as_deref())
            .unwrap_or("Unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn absent_sections_serialize_as_null() {
        let at = Utc.with_ymd_and_hms(2024, 6, 12, 14, 0, 0).unwrap();
        let mut record = ProfileRecord::empty("https://example.com/in/alice", at);
        record.set(SectionPayload::Skills(vec!["Rust".into()]));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["targetId"], "https://example.com/in/alice");
        assert_eq!(json["scrapedAt"], "2024-06-12T14:00:00Z");
        assert!(json["about"].is_null());
        assert_eq!(json["skills"][0], "Rust");
        assert_eq!(record.present_sections(), vec![SectionName::Skills]);
        assert!(!record.is_complete());
    }
}
