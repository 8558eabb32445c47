//! Renders page markup as compact markdown for prompts. Forms, links and
//! buttons are kept verbatim so the model can see names and targets.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use scraper::{ElementRef, Html};

const KEEP: [&str; 3] = ["form", "a", "button"];
const IGNORE: [&str; 7] = ["script", "style", "noscript", "head", "template", "svg", "iframe"];

/// Drops the tag and everything inside it.
#[derive(Clone)]
struct IgnoreTagFactory;

impl html2md::scraper::TagHandlerFactory for IgnoreTagFactory {
    fn instantiate(&self) -> Box<dyn html2md::scraper::TagHandler> {
        Box::new(self.clone())
    }
}

impl html2md::scraper::TagHandler for IgnoreTagFactory {
    fn handle(&mut self, _tag: &html2md::Handle, _printer: &mut html2md::scraper::StructuredPrinter) {}
    fn after_handle(&mut self, _printer: &mut html2md::scraper::StructuredPrinter) {}
    fn skip_descendants(&self) -> bool {
        true
    }
}

/// Prints kept elements as their original HTML. The converter visits them
/// in document order, which is the order `outer_html` was collected in.
#[derive(Clone)]
struct KeepTagFactory {
    outer_html: Rc<Vec<String>>,
    cursor: Rc<Cell<usize>>,
}

impl html2md::scraper::TagHandlerFactory for KeepTagFactory {
    fn instantiate(&self) -> Box<dyn html2md::scraper::TagHandler> {
        Box::new(self.clone())
    }
}

impl html2md::scraper::TagHandler for KeepTagFactory {
    fn handle(&mut self, _tag: &html2md::Handle, printer: &mut html2md::scraper::StructuredPrinter) {
        let index = self.cursor.get();
        self.cursor.set(index + 1);
        if let Some(html) = self.outer_html.get(index) {
            printer.append_str(" ");
            printer.append_str(html);
            printer.append_str(" ");
        }
    }

    fn after_handle(&mut self, _printer: &mut html2md::scraper::StructuredPrinter) {}

    fn skip_descendants(&self) -> bool {
        true
    }
}

/// Outer HTML of every kept element the converter will reach: not nested in
/// another kept element, not under an ignored one.
fn kept_elements(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| KEEP.contains(&el.value().name()))
        .filter(|el| {
            !el.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| KEEP.contains(&a.value().name()) || IGNORE.contains(&a.value().name()))
        })
        .map(|el| el.html())
        .collect()
}

pub fn to_markdown(html: &str) -> String {
    let keep = KeepTagFactory {
        outer_html: Rc::new(kept_elements(html)),
        cursor: Rc::new(Cell::new(0)),
    };

    let mut tag_factory: HashMap<String, Box<dyn html2md::scraper::TagHandlerFactory>> = HashMap::new();
    for tag in IGNORE {
        tag_factory.insert(tag.to_string(), Box::new(IgnoreTagFactory));
    }
    for tag in KEEP {
        tag_factory.insert(tag.to_string(), Box::new(keep.clone()));
    }

    tidy(&html2md::parse_html_custom(html, &tag_factory, false))
}

/// Trim each line and collapse runs of blank lines.
fn tidy(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in raw.lines().map(str::trim) {
        if line.is_empty() && lines.last().is_none_or(|prev| prev.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
