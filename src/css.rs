use lightningcss::declaration::DeclarationBlock;
use lightningcss::printer::PrinterOptions;
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, StyleAttribute, StyleSheet};
use lightningcss::traits::ToCss;

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Specificity(pub u16, pub u16, pub u16);

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeTest {
    Exists,
    Equals(String),
    Includes(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, AttributeTest)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    Adjacent,
    Sibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    // Rightmost compound first; each combinator links a compound to the one after it.
    head: Compound,
    ancestors: Vec<(Combinator, Compound)>,
    pub specificity: Specificity,
}

#[derive(Debug, Clone)]
struct Rule {
    selector: Selector,
    declarations: Vec<Declaration>,
    order: usize,
}

/// Rules from every `<style>` block of a document, in source order.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    /// Collects `<style>` elements anywhere in the document. Unparseable blocks are skipped.
    pub fn from_document(doc: &roxmltree::Document<'_>) -> Stylesheet {
        let mut out = Stylesheet::default();
        let mut order = 0usize;
        for node in doc.descendants().filter(|n| {
            n.is_element()
                && n.tag_name().name() == "style"
                && crate::xml::is_svg_namespace(n.tag_name().namespace())
        }) {
            if let Some(kind) = node.attribute("type") {
                if !kind.trim().is_empty() && !kind.trim().eq_ignore_ascii_case("text/css") {
                    continue;
                }
            }
            let css: String = node
                .children()
                .filter(|child| child.is_text())
                .filter_map(|child| child.text())
                .collect::<String>();
            out.add_css(&css, &mut order);
        }
        out
    }

    pub fn parse(css: &str) -> Stylesheet {
        let mut out = Stylesheet::default();
        let mut order = 0usize;
        out.add_css(css, &mut order);
        out
    }

    fn add_css(&mut self, css: &str, order: &mut usize) {
        let css = css.trim();
        if css.is_empty() {
            return;
        }
        let Ok(sheet) = StyleSheet::parse(css, ParserOptions::default()) else {
            tracing::debug!("skipping unparseable <style> block");
            return;
        };
        collect_rules(&sheet.rules, &mut self.rules, order);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Declarations of every rule matching `node`, lowest precedence first.
    ///
    /// Ordering is by specificity then source order; callers split normal from important.
    pub fn matching(&self, node: roxmltree::Node<'_, '_>) -> Vec<Declaration> {
        let mut matched: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|rule| rule.selector.matches(node))
            .collect();
        matched.sort_by(|a, b| {
            a.selector
                .specificity
                .cmp(&b.selector.specificity)
                .then(a.order.cmp(&b.order))
        });
        matched
            .into_iter()
            .flat_map(|rule| rule.declarations.iter().cloned())
            .collect()
    }
}

fn collect_rules(rules: &CssRuleList<'_>, out: &mut Vec<Rule>, order: &mut usize) {
    for rule in &rules.0 {
        match rule {
            CssRule::Style(style_rule) => {
                let selectors = style_rule
                    .selectors
                    .to_css_string(PrinterOptions::default())
                    .unwrap_or_default();
                let declarations = block_declarations(&style_rule.declarations);
                if declarations.is_empty() {
                    *order += 1;
                    continue;
                }
                for raw in split_selector_list(&selectors) {
                    if let Some(selector) = Selector::parse(raw) {
                        out.push(Rule {
                            selector,
                            declarations: declarations.clone(),
                            order: *order,
                        });
                    }
                }
                *order += 1;
            }
            // Media queries are not evaluated; print output always applies them.
            CssRule::Media(media) => collect_rules(&media.rules, out, order),
            _ => {}
        }
    }
}

fn split_selector_list(input: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, ch) in input.char_indices() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                out.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&input[start..]);
    out
}

/// Declarations of an inline `style` attribute, normal ones first.
pub fn parse_style_attribute(input: &str) -> Vec<Declaration> {
    match StyleAttribute::parse(input, ParserOptions::default()) {
        Ok(attribute) => block_declarations(&attribute.declarations),
        Err(_) => split_declarations(input),
    }
}

fn block_declarations(block: &DeclarationBlock<'_>) -> Vec<Declaration> {
    let normal = block.declarations.iter().map(|property| (property, false));
    let important = block
        .important_declarations
        .iter()
        .map(|property| (property, true));
    normal
        .chain(important)
        .filter_map(|(property, important)| {
            let value = property
                .value_to_css_string(PrinterOptions::default())
                .ok()?;
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            Some(Declaration {
                name: property.property_id().name().to_ascii_lowercase(),
                value: value.to_string(),
                important,
            })
        })
        .collect()
}

// Legacy splitter for blocks lightningcss rejects outright. Malformed entries are dropped.
fn split_declarations(input: &str) -> Vec<Declaration> {
    let mut out = Vec::new();
    for raw in split_top_level(input, ';') {
        let Some((name, value)) = raw.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        let mut value = value.trim();
        let mut important = false;
        if let Some(bang) = value.rfind('!') {
            if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
                important = true;
                value = value[..bang].trim_end();
            }
        }
        if value.is_empty() {
            continue;
        }
        out.push(Declaration {
            name,
            value: value.to_string(),
            important,
        });
    }
    out
}

fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (i, ch) in input.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, c) if c == separator && depth <= 0 => {
                out.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&input[start..]);
    out
}

impl Selector {
    /// Restricted grammar: type, `*`, class, id and attribute tests joined by descendant,
    /// child, adjacent and general sibling combinators. Anything else rejects the selector.
    pub fn parse(raw: &str) -> Option<Selector> {
        let tokens = tokenize_selector(raw.trim())?;
        let mut compounds: Vec<Compound> = Vec::new();
        let mut combinators: Vec<Combinator> = Vec::new();
        let mut pending: Option<Combinator> = None;

        for token in tokens {
            match token {
                SelectorToken::Combinator(c) => {
                    if compounds.is_empty() {
                        return None;
                    }
                    // An explicit combinator overrides the whitespace around it.
                    pending = match (pending, c) {
                        (Some(Combinator::Descendant) | None, c) => Some(c),
                        (Some(existing), Combinator::Descendant) => Some(existing),
                        (Some(_), _) => return None,
                    };
                }
                SelectorToken::Compound(text) => {
                    let compound = parse_compound(&text)?;
                    if !compounds.is_empty() {
                        combinators.push(pending.take().unwrap_or(Combinator::Descendant));
                    }
                    compounds.push(compound);
                }
            }
        }
        if compounds.is_empty() || matches!(pending, Some(c) if c != Combinator::Descendant) {
            return None;
        }

        let mut specificity = Specificity::default();
        for compound in &compounds {
            if compound.id.is_some() {
                specificity.0 += 1;
            }
            specificity.1 += (compound.classes.len() + compound.attributes.len()) as u16;
            if compound.tag.is_some() {
                specificity.2 += 1;
            }
        }

        let mut compounds = compounds.into_iter().rev();
        let head = compounds.next()?;
        let ancestors = combinators.into_iter().rev().zip(compounds).collect();
        Some(Selector {
            head,
            ancestors,
            specificity,
        })
    }

    pub fn matches(&self, node: roxmltree::Node<'_, '_>) -> bool {
        compound_matches(node, &self.head) && self.matches_from(node, 0)
    }

    fn matches_from(&self, node: roxmltree::Node<'_, '_>, index: usize) -> bool {
        let Some((combinator, compound)) = self.ancestors.get(index) else {
            return true;
        };
        match combinator {
            Combinator::Child => node
                .parent_element()
                .is_some_and(|p| compound_matches(p, compound) && self.matches_from(p, index + 1)),
            Combinator::Descendant => {
                let mut cursor = node.parent_element();
                while let Some(candidate) = cursor {
                    if compound_matches(candidate, compound)
                        && self.matches_from(candidate, index + 1)
                    {
                        return true;
                    }
                    cursor = candidate.parent_element();
                }
                false
            }
            Combinator::Adjacent => node.prev_sibling_element().is_some_and(|s| {
                compound_matches(s, compound) && self.matches_from(s, index + 1)
            }),
            Combinator::Sibling => {
                let mut cursor = node.prev_sibling_element();
                while let Some(candidate) = cursor {
                    if compound_matches(candidate, compound)
                        && self.matches_from(candidate, index + 1)
                    {
                        return true;
                    }
                    cursor = candidate.prev_sibling_element();
                }
                false
            }
        }
    }
}

enum SelectorToken {
    Compound(String),
    Combinator(Combinator),
}

fn tokenize_selector(input: &str) -> Option<Vec<SelectorToken>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;

    let flush = |current: &mut String, tokens: &mut Vec<SelectorToken>| {
        if !current.is_empty() {
            tokens.push(SelectorToken::Compound(std::mem::take(current)));
        }
    };

    for ch in input.chars() {
        if in_brackets {
            current.push(ch);
            if ch == ']' {
                in_brackets = false;
            }
            continue;
        }
        match ch {
            '[' => {
                in_brackets = true;
                current.push(ch);
            }
            c if c.is_whitespace() => {
                flush(&mut current, &mut tokens);
                if !matches!(tokens.last(), Some(SelectorToken::Combinator(_)) | None) {
                    tokens.push(SelectorToken::Combinator(Combinator::Descendant));
                }
            }
            '>' | '+' | '~' => {
                flush(&mut current, &mut tokens);
                let combinator = match ch {
                    '>' => Combinator::Child,
                    '+' => Combinator::Adjacent,
                    _ => Combinator::Sibling,
                };
                if let Some(SelectorToken::Combinator(Combinator::Descendant)) = tokens.last() {
                    tokens.pop();
                }
                tokens.push(SelectorToken::Combinator(combinator));
            }
            _ => current.push(ch),
        }
    }
    if in_brackets {
        return None;
    }
    flush(&mut current, &mut tokens);
    if let Some(SelectorToken::Combinator(Combinator::Descendant)) = tokens.last() {
        tokens.pop();
    }
    Some(tokens)
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'-')
}

fn parse_compound(token: &str) -> Option<Compound> {
    let bytes = token.as_bytes();
    let len = bytes.len();
    let mut i = 0usize;
    let mut compound = Compound::default();
    if len == 0 {
        return None;
    }

    if bytes[0] == b'*' {
        i = 1;
    } else if is_ident_start(bytes[0]) {
        while i < len && (is_ident_char(bytes[i]) || bytes[i] == b'|') {
            i += 1;
        }
        let name = &token[..i];
        // Namespace prefixes ("svg|rect") match the local name.
        let local = name.rsplit('|').next().unwrap_or(name);
        if local != "*" {
            compound.tag = Some(local.to_string());
        }
    }

    while i < len {
        match bytes[i] {
            b'.' | b'#' => {
                let marker = bytes[i];
                i += 1;
                let start = i;
                while i < len && is_ident_char(bytes[i]) {
                    i += 1;
                }
                if start == i {
                    return None;
                }
                let ident = token[start..i].to_string();
                if marker == b'.' {
                    compound.classes.push(ident);
                } else {
                    if compound.id.is_some() {
                        return None;
                    }
                    compound.id = Some(ident);
                }
            }
            b'[' => {
                let close = token[i..].find(']')? + i;
                compound.attributes.push(parse_attribute_test(&token[i + 1..close])?);
                i = close + 1;
            }
            _ => return None,
        }
    }
    Some(compound)
}

fn parse_attribute_test(inner: &str) -> Option<(String, AttributeTest)> {
    let unquote = |v: &str| v.trim().trim_matches('"').trim_matches('\'').to_string();
    if let Some((name, value)) = inner.split_once("~=") {
        return Some((name.trim().to_string(), AttributeTest::Includes(unquote(value))));
    }
    if let Some((name, value)) = inner.split_once('=') {
        let name = name.trim();
        if name.ends_with(['|', '^', '$', '*']) {
            return None;
        }
        return Some((name.to_string(), AttributeTest::Equals(unquote(value))));
    }
    let name = inner.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), AttributeTest::Exists))
}

fn compound_matches(node: roxmltree::Node<'_, '_>, compound: &Compound) -> bool {
    if let Some(tag) = &compound.tag {
        if node.tag_name().name() != tag {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if node.attribute("id") != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let Some(node_classes) = node.attribute("class") else {
            return false;
        };
        if !compound
            .classes
            .iter()
            .all(|class| node_classes.split_whitespace().any(|c| c == class))
        {
            return false;
        }
    }
    compound.attributes.iter().all(|(name, test)| {
        let Some(value) = node.attribute(name.as_str()) else {
            return false;
        };
        match test {
            AttributeTest::Exists => true,
            AttributeTest::Equals(expected) => value == expected,
            AttributeTest::Includes(word) => value.split_whitespace().any(|w| w == word),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a, 'i>(doc: &'a roxmltree::Document<'i>, id: &str) -> roxmltree::Node<'a, 'i> {
        doc.descendants()
            .find(|n| n.attribute("id") == Some(id))
            .expect("node with id")
    }

    #[test]
    fn style_attribute_separates_importance() {
        let decls = parse_style_attribute("fill: red; stroke: url(#a) !important; stop-color: blue");
        let find = |name: &str| decls.iter().find(|d| d.name == name).expect("declaration");
        assert!(!find("fill").important);
        assert_eq!(
            crate::color::parse_color(&find("fill").value).map(|(c, _)| c),
            Some(crate::types::Color::rgb(255, 0, 0))
        );
        let stroke = find("stroke");
        assert!(stroke.important);
        assert_eq!(crate::color::parse_url_ref(&stroke.value).as_deref(), Some("a"));
        assert_eq!(
            crate::color::parse_color(&find("stop-color").value).map(|(c, _)| c),
            Some(crate::types::Color::rgb(0, 0, 255))
        );
        // Normal declarations come before important ones.
        assert!(decls.last().is_some_and(|d| d.important));
    }

    #[test]
    fn legacy_split_keeps_quoted_separators() {
        let decls = split_declarations("fill: red; stroke:url('#a;b') !important;; bogus");
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].name, "fill");
        assert!(!decls[0].important);
        assert_eq!(decls[1].value, "url('#a;b')");
        assert!(decls[1].important);
    }

    #[test]
    fn specificity_counts() {
        let s = Selector::parse("g#main .a.b > rect[x]").expect("valid");
        assert_eq!(s.specificity, Specificity(1, 3, 2));
        assert!(Selector::parse("rect:hover").is_none());
        assert!(Selector::parse("> rect").is_none());
    }

    #[test]
    fn combinators_match() {
        let xml = r#"<svg xmlns="http://www.w3.org/2000/svg">
            <g class="outer"><g><rect id="deep"/></g><circle id="first"/><rect id="next"/><line id="later"/></g>
        </svg>"#;
        let doc = roxmltree::Document::parse(xml).expect("xml");
        let deep = find(&doc, "deep");
        let next = find(&doc, "next");
        let later = find(&doc, "later");

        assert!(Selector::parse(".outer rect").is_some_and(|s| s.matches(deep)));
        assert!(!Selector::parse(".outer > rect").is_some_and(|s| s.matches(deep)));
        assert!(Selector::parse(".outer > rect").is_some_and(|s| s.matches(next)));
        assert!(Selector::parse("circle + rect").is_some_and(|s| s.matches(next)));
        assert!(!Selector::parse("circle + line").is_some_and(|s| s.matches(later)));
        assert!(Selector::parse("circle ~ line").is_some_and(|s| s.matches(later)));
        assert!(Selector::parse("*").is_some_and(|s| s.matches(later)));
    }

    #[test]
    fn stylesheet_orders_by_specificity_then_source() {
        let xml = r#"<svg xmlns="http://www.w3.org/2000/svg">
            <style>#r { fill: blue } rect { fill: green } .c { fill: red; stroke: black !important }</style>
            <rect id="r" class="c"/>
        </svg>"#;
        let doc = roxmltree::Document::parse(xml).expect("xml");
        let sheet = Stylesheet::from_document(&doc);
        let decls = sheet.matching(find(&doc, "r"));
        let fills: Vec<&str> = decls
            .iter()
            .filter(|d| d.name == "fill")
            .map(|d| d.value.as_str())
            .collect();
        assert_eq!(fills.len(), 3);
        // Type rule first, id rule last.
        assert_eq!(
            crate::color::parse_color(fills[0]).map(|(c, _)| c),
            Some(crate::types::Color::rgb(0, 128, 0))
        );
        assert_eq!(
            crate::color::parse_color(fills[2]).map(|(c, _)| c),
            Some(crate::types::Color::rgb(0, 0, 255))
        );
        assert!(decls.iter().any(|d| d.name == "stroke" && d.important));
    }
}
