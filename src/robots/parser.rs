//! Robots.txt rules for the catalog host
//!
//! Matching is delegated to the robotstxt crate; the crawl delay directive is
//! read separately because the crate does not expose it.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
}

impl ParsedRobots {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Used when robots.txt is missing or cannot be fetched
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
        }
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL of the page
    /// * `user_agent` - Product token of the crawler (e.g. "MixDbCrawler")
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Crawl-delay in seconds for the user agent, falling back to the `*` group
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        let agent = user_agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_agents = false;
        let mut wildcard = None;
        let mut specific = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "user-agent" => {
                    // Consecutive User-agent lines share one group
                    if !in_agents {
                        group.clear();
                    }
                    group.push(value.to_lowercase());
                    in_agents = true;
                }
                "crawl-delay" => {
                    in_agents = false;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        specific = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        wildcard = Some(delay);
                    }
                }
                _ => in_agents = false,
            }
        }

        specific.or(wildcard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPLORER: &str = "https://www.mixesdb.com/w/MixesDB:Explorer/Mixes?do=mx&style=TA&offset=25";

    // Wiki special pages and the API are off limits
    const WIKI_ROBOTS: &str = "User-agent: *\n\
                               Disallow: /w/Special:\n\
                               Disallow: /db/api.php\n\
                               Crawl-delay: 4\n";

    #[test]
    fn test_missing_robots_allows_explorer() {
        assert!(ParsedRobots::allow_all().is_allowed(EXPLORER, "MixDbCrawler"));
        assert!(ParsedRobots::from_content("  \n").is_allowed(EXPLORER, "MixDbCrawler"));
    }

    #[test]
    fn test_wiki_rules() {
        let robots = ParsedRobots::from_content(WIKI_ROBOTS);
        assert!(robots.is_allowed(EXPLORER, "MixDbCrawler"));
        assert!(!robots.is_allowed("https://www.mixesdb.com/w/Special:Random", "MixDbCrawler"));
        assert!(!robots.is_allowed("https://www.mixesdb.com/db/api.php?action=query", "MixDbCrawler"));
        assert_eq!(robots.crawl_delay("MixDbCrawler"), Some(4.0));
    }

    #[test]
    fn test_named_group_overrides_wildcard() {
        let content = "User-agent: MixDbCrawler\nDisallow: /w/\n\nUser-agent: *\nAllow: /";
        let robots = ParsedRobots::from_content(content);
        assert!(!robots.is_allowed(EXPLORER, "MixDbCrawler"));
        assert!(robots.is_allowed(EXPLORER, "SomeoneElse"));
    }

    #[test]
    fn test_crawl_delay_prefers_named_group() {
        let content = "User-agent: *\nCrawl-delay: 10\n\nUser-agent: MixDbCrawler\nCrawl-delay: 2.5";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("MixDbCrawler"), Some(2.5));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(10.0));
        assert_eq!(ParsedRobots::allow_all().crawl_delay("MixDbCrawler"), None);
    }

    #[test]
    fn test_crawl_delay_shared_group() {
        let content = "User-agent: BotA\nUser-agent: MixDbCrawler\nCrawl-delay: 3 # be gentle";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("MixDbCrawler"), Some(3.0));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }
}
