//! HTTP-backed session, driver and section locator.
//!
//! Pages are fetched as static HTML with a cookie-carrying blocking client and
//! read with CSS selectors. Scrolling and clicking have no effect on static
//! HTML, so the driver reports both as no-ops.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use log::{debug, info, warn};
use url::Url;

use crate::config::{Credentials, SiteConfig};
use crate::error::{LocateError, SessionError};
use crate::profile::SectionName;
use crate::session::{Authenticator, NavigationDriver, PageHandle, RawSection, SectionLocator, Session};

fn build_client(site: &SiteConfig) -> Result<Client, SessionError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    Client::builder()
        .timeout(site.request_timeout)
        .default_headers(headers)
        .cookie_store(true)
        .build()
        .map_err(|e| SessionError::LoginFailed(format!("could not build HTTP client: {}", e)))
}

fn looks_like_login_page(url: &str, login_url: &str) -> bool {
    url.starts_with(login_url) || url.contains("/authwall") || url.contains("/checkpoint/")
}

/// Submits the operator's credentials through the site's login form.
pub struct HttpAuthenticator {
    credentials: Credentials,
    site: SiteConfig,
}

impl HttpAuthenticator {
    pub fn new(credentials: &Credentials, site: &SiteConfig) -> Self {
        HttpAuthenticator {
            credentials: credentials.clone(),
            site: site.clone(),
        }
    }

    /// Hidden inputs plus the resolved form action of the first form that has
    /// a password field.
    fn login_form(&self, html: &str, page_url: &Url) -> Option<(Url, HashMap<String, String>, String, String)> {
        let document = Html::parse_document(html);
        let form_selector = Selector::parse("form").unwrap();
        let input_selector = Selector::parse("input").unwrap();

        for form in document.select(&form_selector) {
            let mut fields = HashMap::new();
            let mut user_field = None;
            let mut password_field = None;

            for input in form.select(&input_selector) {
                let attrs = input.value();
                let Some(name) = attrs.attr("name") else { continue };
                match attrs.attr("type").unwrap_or("text") {
                    "hidden" => {
                        fields.insert(name.to_string(), attrs.attr("value").unwrap_or("").to_string());
                    }
                    "password" => password_field = Some(name.to_string()),
                    "email" | "text" if user_field.is_none() => user_field = Some(name.to_string()),
                    _ => {}
                }
            }

            if let (Some(user), Some(password)) = (user_field, password_field) {
                let action = form
                    .value()
                    .attr("action")
                    .and_then(|a| page_url.join(a).ok())
                    .unwrap_or_else(|| page_url.clone());
                return Some((action, fields, user, password));
            }
        }
        None
    }
}

impl Authenticator for HttpAuthenticator {
    fn login(&self) -> Result<Session, SessionError> {
        let client = build_client(&self.site)?;
        info!("Logging in at {}", self.site.login_url);

        let resp = client
            .get(&self.site.login_url)
            .send()
            .map_err(|e| SessionError::LoginFailed(format!("login page unreachable: {}", e)))?;
        let page_url = resp.url().clone();
        let html = resp
            .text()
            .map_err(|e| SessionError::LoginFailed(format!("could not read login page: {}", e)))?;

        let (action, mut fields, user_field, password_field) = self
            .login_form(&html, &page_url)
            .ok_or_else(|| SessionError::LoginFailed("no login form found".into()))?;
        fields.insert(user_field, self.credentials.email.clone());
        fields.insert(password_field, self.credentials.password.clone());

        let resp = client
            .post(action)
            .form(&fields)
            .send()
            .map_err(|e| SessionError::LoginFailed(format!("credential submission failed: {}", e)))?;

        let landed = resp.url().to_string();
        if landed.contains("/checkpoint/") {
            return Err(SessionError::LoginFailed(format!(
                "manual verification required at {}",
                landed
            )));
        }
        if !resp.status().is_success() || looks_like_login_page(&landed, &self.site.login_url) {
            return Err(SessionError::LoginFailed(format!(
                "still on the login page after submitting credentials (status {})",
                resp.status()
            )));
        }

        info!("Successfully logged in");
        Ok(Session::new(Box::new(HttpDriver::new(client, &self.site))))
    }
}

pub struct HttpDriver {
    client: Client,
    base_url: String,
    login_url: String,
}

impl HttpDriver {
    pub fn new(client: Client, site: &SiteConfig) -> Self {
        HttpDriver {
            client,
            base_url: site.base_url.clone(),
            login_url: site.login_url.clone(),
        }
    }

    fn resolve(&self, target_id: &str) -> String {
        if target_id.starts_with("http://") || target_id.starts_with("https://") {
            target_id.to_string()
        } else {
            format!("{}/in/{}", self.base_url, target_id.trim_matches('/'))
        }
    }
}

impl NavigationDriver for HttpDriver {
    fn open(&mut self, target_id: &str) -> Result<PageHandle, SessionError> {
        let url = self.resolve(target_id);
        let unreachable_err = |reason: String| SessionError::Unreachable { target: target_id.to_string(), reason };

        let resp = self.client.get(&url).send().map_err(|e| unreachable_err(e.to_string()))?;
        let status = resp.status();
        let final_url = resp.url().to_string();

        match status.as_u16() {
            401 | 403 => {
                return Err(SessionError::AuthenticationLost { target: target_id.to_string() });
            }
            // No backoff: the inter-target delay already paces the run.
            429 | 999 => warn!("Possible rate limiting on {} (status {})", target_id, status),
            _ if status.is_client_error() || status.is_server_error() => {
                return Err(unreachable_err(format!("status {}", status)));
            }
            _ => {}
        }

        if looks_like_login_page(&final_url, &self.login_url) {
            return Err(SessionError::AuthenticationLost { target: target_id.to_string() });
        }

        let content = resp.text().map_err(|e| unreachable_err(e.to_string()))?;
        Ok(PageHandle {
            target_id: target_id.to_string(),
            url: final_url,
            content,
        })
    }

    fn scroll_by(&mut self, _page: &mut PageHandle, _pixels: i64) -> Result<bool, SessionError> {
        Ok(false)
    }

    fn click_element(&mut self, page: &mut PageHandle, selector: &str) -> Result<bool, SessionError> {
        debug!("Static page {}: not clicking '{}'", page.target_id, selector);
        Ok(false)
    }

    fn close(&mut self) {
        debug!("Releasing HTTP session");
    }
}

/// Container and per-entry selectors for one list section.
struct ListSelectors {
    container: Selector,
    items: Selector,
}

/// Finds profile sections in static profile HTML.
pub struct HtmlSectionLocator {
    name: Selector,
    headline: Selector,
    location: Selector,
    about: Selector,
    visible_text: Selector,
    login_form: Selector,
    lists: HashMap<SectionName, ListSelectors>,
}

impl HtmlSectionLocator {
    pub fn new() -> Self {
        let list = |section: &str| ListSelectors {
            container: Selector::parse(&format!("section[data-section='{}']", section)).unwrap(),
            items: Selector::parse(&format!("section[data-section='{}'] li.artdeco-list__item", section)).unwrap(),
        };
        let mut lists = HashMap::new();
        lists.insert(SectionName::Experience, list("experience"));
        lists.insert(SectionName::Education, list("education"));
        lists.insert(SectionName::Skills, list("skills"));
        lists.insert(SectionName::Certifications, list("certifications"));
        lists.insert(SectionName::Languages, list("languages"));

        HtmlSectionLocator {
            name: Selector::parse("h1.text-heading-xlarge, h1").unwrap(),
            headline: Selector::parse("div.text-body-medium").unwrap(),
            location: Selector::parse("span.text-body-small").unwrap(),
            about: Selector::parse("section[data-section='summary'] div.display-flex.ph5.pv3").unwrap(),
            visible_text: Selector::parse("span[aria-hidden='true']").unwrap(),
            login_form: Selector::parse("form input[type='password']").unwrap(),
            lists,
        }
    }

    fn first_text(document: &Html, selector: &Selector) -> String {
        document
            .select(selector)
            .next()
            .map(|e| e.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
    }

    /// Text lines of one element. Prefers the visible-text spans the site
    /// renders for screen output, falling back to every text node.
    fn lines_of(&self, element: ElementRef<'_>) -> Vec<String> {
        let visible: Vec<String> = element
            .select(&self.visible_text)
            .map(|e| e.text().collect::<String>())
            .collect();
        let lines: Vec<String> = if visible.is_empty() {
            element.text().map(str::to_string).collect()
        } else {
            visible
        };
        lines.into_iter().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()
    }
}

impl Default for HtmlSectionLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionLocator for HtmlSectionLocator {
    fn locate(&self, page: &PageHandle, section: SectionName) -> Result<Option<RawSection>, LocateError> {
        let document = Html::parse_document(&page.content);

        // Served a login form in place of the profile: the session is gone.
        if document.select(&self.login_form).next().is_some() {
            return Err(SessionError::AuthenticationLost { target: page.target_id.clone() }.into());
        }

        match section {
            SectionName::BasicInfo => {
                let lines = vec![
                    Self::first_text(&document, &self.name),
                    Self::first_text(&document, &self.headline),
                    Self::first_text(&document, &self.location),
                ];
                if lines.iter().all(|l| l.trim().is_empty()) {
                    return Ok(None);
                }
                Ok(Some(RawSection::single(lines)))
            }
            SectionName::About => Ok(document
                .select(&self.about)
                .next()
                .map(|e| RawSection::single(self.lines_of(e)))),
            list_section => {
                let Some(selectors) = self.lists.get(&list_section) else {
                    return Ok(None);
                };
                if document.select(&selectors.container).next().is_none() {
                    return Ok(None);
                }
                let blocks: Vec<Vec<String>> = document.select(&selectors.items).map(|item| self.lines_of(item)).collect();
                if blocks.is_empty() {
                    return Err(LocateError::Layout(format!("{} section has no list items", list_section)));
                }
                Ok(Some(RawSection::from_blocks(blocks)))
            }
        }
    }

    fn expander(&self, section: SectionName) -> Option<&str> {
        match section {
            SectionName::About => Some("button[aria-label*='more about']"),
            SectionName::Experience => Some("section[data-section='experience'] button[aria-label*='Show all']"),
            SectionName::Skills => Some("section[data-section='skills'] button[aria-label*='Show all']"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PROFILE: &str = r#"
        <html><body>
          <h1 class="text-heading-xlarge">Ada Lovelace</h1>
          <div class="text-body-medium">Analyst of engines</div>
          <span class="text-body-small">London</span>
          <section data-section="summary"><div class="display-flex ph5 pv3"><span aria-hidden="true">Poetical science.</span></div></section>
          <section data-section="experience">
            <ul>
              <li class="artdeco-list__item">
                <span aria-hidden="true">Collaborator</span>
                <span aria-hidden="true">Analytical Engine</span>
                <span aria-hidden="true">1842 - 1843</span>
              </li>
            </ul>
          </section>
          <section data-section="skills"><ul></ul></section>
        </body></html>"#;

    fn page(content: &str) -> PageHandle {
        PageHandle {
            target_id: "https://example.com/in/ada".into(),
            url: "https://example.com/in/ada".into(),
            content: content.into(),
        }
    }

    #[test]
    fn locates_sections_in_profile_html() {
        let locator = HtmlSectionLocator::new();
        let page = page(PROFILE);

        let basic = locator.locate(&page, SectionName::BasicInfo).unwrap().unwrap();
        assert_eq!(basic.blocks[0], vec!["Ada Lovelace", "Analyst of engines", "London"]);

        let about = locator.locate(&page, SectionName::About).unwrap().unwrap();
        assert_eq!(about.blocks[0], vec!["Poetical science."]);

        let experience = locator.locate(&page, SectionName::Experience).unwrap().unwrap();
        assert_eq!(experience.blocks.len(), 1);
        assert_eq!(experience.blocks[0][2], "1842 - 1843");

        assert!(locator.locate(&page, SectionName::Education).unwrap().is_none());
        assert!(matches!(locator.locate(&page, SectionName::Skills), Err(LocateError::Layout(_))));
    }

    #[test]
    fn login_wall_is_a_session_failure() {
        let locator = HtmlSectionLocator::new();
        let wall = page(r#"<form><input name="session_key"><input type="password" name="session_password"></form>"#);
        assert!(matches!(
            locator.locate(&wall, SectionName::About),
            Err(LocateError::Session(SessionError::AuthenticationLost { .. }))
        ));
    }

    #[test]
    fn finds_login_form_fields() {
        let site = SiteConfig {
            base_url: "https://example.com".into(),
            login_url: "https://example.com/login".into(),
            profile_marker: "/in/".into(),
            request_timeout: Duration::from_secs(5),
            headless: true,
        };
        let auth = HttpAuthenticator::new(
            &Credentials { email: "me@example.com".into(), password: "pw".into() },
            &site,
        );
        let html = r#"<form action="/checkpoint/lg/login-submit">
            <input type="hidden" name="loginCsrfParam" value="abc">
            <input type="text" name="session_key">
            <input type="password" name="session_password">
        </form>"#;
        let base = Url::parse("https://example.com/login").unwrap();
        let (action, fields, user, password) = auth.login_form(html, &base).unwrap();
        assert_eq!(action.as_str(), "https://example.com/checkpoint/lg/login-submit");
        assert_eq!(fields.get("loginCsrfParam").map(String::as_str), Some("abc"));
        assert_eq!(user, "session_key");
        assert_eq!(password, "session_password");
    }

    #[test]
    fn bare_handles_resolve_under_base_url() {
        let site = SiteConfig {
            base_url: "https://example.com".into(),
            login_url: "https://example.com/login".into(),
            profile_marker: "/in/".into(),
            request_timeout: Duration::from_secs(5),
            headless: false,
        };
        let driver = HttpDriver::new(build_client(&site).unwrap(), &site);
        assert_eq!(driver.resolve("ada"), "https://example.com/in/ada");
        assert_eq!(driver.resolve("https://example.com/in/ada"), "https://example.com/in/ada");
    }
}
