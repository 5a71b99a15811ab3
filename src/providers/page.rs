//! HTML pages scraped from providers without an API.

use scraper::{ElementRef, Html, Selector};

/// Compile a selector literal.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css}: {e}"))
}

/// A parsed provider page.
pub(crate) struct Page {
    document: Html,
}

impl Page {
    pub fn parse(body: &str) -> Self {
        Self {
            document: Html::parse_document(body),
        }
    }

    /// Whether any element matches.
    pub fn exists(&self, selector: &Selector) -> bool {
        self.document.select(selector).next().is_some()
    }

    /// Trimmed text of every matching element.
    pub fn texts<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = String> + 'a {
        self.document.select(selector).map(element_text)
    }

    /// Trimmed text of the first matching element.
    pub fn first_text(&self, selector: &Selector) -> Option<String> {
        self.document.select(selector).next().map(element_text)
    }

    /// Number of matching elements whose text is `text`, ignoring ASCII case.
    pub fn count_text(&self, selector: &Selector, text: &str) -> usize {
        self.texts(selector)
            .filter(|t| t.eq_ignore_ascii_case(text))
            .count()
    }

    /// Attribute of the first matching element.
    pub fn attr(&self, selector: &Selector, name: &str) -> Option<String> {
        self.document
            .select(selector)
            .next()
            .and_then(|el| el.value().attr(name))
            .map(str::to_string)
    }

    /// Visible text of the whole page with whitespace collapsed.
    pub fn text(&self) -> String {
        normalize_whitespace(&self.document.root_element().text().collect::<String>())
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <form><input type="hidden" name="cid" value="abc123"></form>
        <table><tbody>
            <tr><td>Spamhaus</td><td class="status"> Listed </td></tr>
            <tr><td>SORBS</td><td>Not listed</td></tr>
        </tbody></table>
        </body></html>"#;

    #[test]
    fn test_count_text() {
        let page = Page::parse(PAGE);
        let cells = selector("td");
        assert_eq!(page.count_text(&cells, "Listed"), 1);
        assert_eq!(page.count_text(&cells, "not listed"), 1);
        assert_eq!(page.count_text(&cells, "Barracuda"), 0);
    }

    #[test]
    fn test_attr_and_exists() {
        let page = Page::parse(PAGE);
        assert_eq!(
            page.attr(&selector(r#"input[name="cid"]"#), "value").as_deref(),
            Some("abc123")
        );
        assert!(page.exists(&selector("tbody > tr")));
        assert!(!page.exists(&selector(".failure-message")));
    }

    #[test]
    fn test_text_collapses_whitespace() {
        let page = Page::parse("<p>We   don't\n have <b>data</b></p>");
        assert_eq!(page.text(), "We don't have data");
        assert_eq!(
            page.first_text(&selector("p")).as_deref(),
            Some("We don't have data")
        );
    }
}
