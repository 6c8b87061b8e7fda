//! Built-in scenarios for the component showcase page
//!
//! These cover the showcase's section structure, its display and layout
//! components, and the interactive overlays (dialog, tooltip, toast,
//! select). Each takes the path or URL of the showcase's `index.html`.

use crate::{Locator, Scenario, Step};

/// Default location of the showcase relative to the working directory
pub const DEFAULT_DOCUMENT: &str = "basecoat-clone-ui/index.html";

const PAGE_TITLE: &str = "Component Showcase";

fn heading(name: &str) -> Locator {
    Locator::role_named("heading", name)
}

fn button(name: &str) -> Locator {
    Locator::role_named("button", name)
}

/// All built-in scenarios, in the order they run
pub fn scenarios(document: &str) -> Vec<Scenario> {
    vec![
        page_structure(document),
        display_components(document),
        layout_components(document),
        full_library(document),
        components(document),
        interactions(document),
        select_option(document),
    ]
}

/// Every top-level section heading is present
pub fn page_structure(document: &str) -> Scenario {
    let sections = [
        "Display",
        "Buttons & Controls",
        "Form Inputs",
        "Overlays & Feedback",
        "Layout & Structure",
    ];
    Scenario::new("page-structure", document)
        .describe("Top-level section headings are rendered")
        .tag("structure")
        .viewport(1280, 4000)
        .steps(sections.iter().map(|s| Step::assert_visible(heading(s))))
}

/// Alert, avatar and badge render
pub fn display_components(document: &str) -> Scenario {
    let alert = Locator::css(".alert").first();
    Scenario::new("display-components", document)
        .describe("Alert, avatar and badge components render")
        .tag("display")
        .viewport(1280, 2000)
        .step(Step::assert_visible(alert.clone()))
        .step(Step::assert_visible(
            alert.locate(Locator::role_named("heading", "Alert Title")),
        ))
        .step(Step::assert_visible(Locator::css(r#"img[alt="User Avatar"]"#)))
        .step(Step::assert_visible(Locator::text("CN")))
        .step(Step::assert_visible(Locator::text("Default")))
        .step(Step::assert_visible(Locator::text("Primary")))
}

/// The layout section's components render inside its preview
pub fn layout_components(document: &str) -> Scenario {
    let section = heading("Layout & Structure")
        .parent()
        .locate(Locator::css(".component-preview"));
    let parts = [".aspect-ratio-16-9", ".separator", ".resizable", ".scroll-area"];

    Scenario::new("layout-components", document)
        .describe("Aspect ratio, separator, resizable, scroll area and table render")
        .tag("layout")
        .viewport(1280, 4000)
        .steps(
            parts
                .iter()
                .map(|css| Step::assert_visible(section.clone().locate(Locator::css(*css)))),
        )
        .step(Step::assert_visible(section.locate(Locator::role("table"))))
}

/// Component headings across the library, with the select left open
pub fn full_library(document: &str) -> Scenario {
    let headings = [
        "Button",
        "Accordion",
        "Dialog",
        "Tooltip",
        "Toast",
        "Card",
        "Forms",
        "Advanced Forms & Inputs",
        "Alert",
        "Avatar",
        "Badge",
    ];
    Scenario::new("full-library", document)
        .describe("Every component heading renders; the select popover opens")
        .tag("structure")
        .tag("interaction")
        .viewport(1280, 3200)
        .steps(headings.iter().map(|h| Step::assert_visible(heading(h))))
        .step(Step::assert_visible(Locator::css(".select-trigger")))
        .step(Step::click(Locator::css(".select-trigger")))
        .step(Step::assert_visible(Locator::css(".select-popover")))
}

/// Plain capture after fonts and layout settle
pub fn components(document: &str) -> Scenario {
    Scenario::new("components", document)
        .describe("Full-page capture at the default viewport")
        .tag("smoke")
        .step(Step::wait(1000))
}

/// Overlays open and close; the capture shows every overlay dismissed
pub fn interactions(document: &str) -> Scenario {
    let dialog = Locator::role("dialog");
    let tooltip = Locator::text("This is a tooltip!");
    let popover = Locator::css(".select-popover");
    let title = Locator::role_named("heading", PAGE_TITLE);

    Scenario::new("interactions", document)
        .describe("Dialog, tooltip, toast and select open and dismiss")
        .tag("interaction")
        .viewport(1280, 4000)
        // dialog
        .step(Step::click(button("Open Dialog")))
        .step(Step::assert_visible(dialog.clone()))
        .step(Step::click(dialog.clone().locate(button("Close"))))
        .step(Step::assert_not_visible(dialog))
        // tooltip fades out through an opacity transition
        .step(Step::hover(button("Hover me")))
        .step(Step::assert_visible(tooltip.clone()))
        .step(Step::hover(title.clone()))
        .step(Step::assert_css(tooltip, "opacity", "0"))
        // toast
        .step(Step::click(button("Show Toast")))
        .step(Step::assert_visible(Locator::text("Your message has been sent.")))
        // select closes on an outside click
        .step(Step::click(Locator::css(".select-trigger")))
        .step(Step::assert_visible(popover.clone()))
        .step(Step::click(title))
        .step(Step::assert_css(popover, "opacity", "0"))
        // let the toast finish animating out
        .step(Step::wait(1000))
}

/// Each overlay opens in turn, then choosing a select option updates the
/// trigger; the resizable panel renders
pub fn select_option(document: &str) -> Scenario {
    let dialog = Locator::role("dialog");
    let trigger = Locator::css(".select-trigger");
    let popover = Locator::css(".select-popover");

    Scenario::new("select-option", document)
        .describe("Dialog, tooltip and toast open; selecting an option updates the select trigger")
        .tag("interaction")
        .viewport(1280, 4000)
        .step(Step::click(button("Open Dialog")))
        .step(Step::assert_visible(dialog.clone()))
        .step(Step::assert_visible(dialog.clone().locate(heading("Dialog Title"))))
        .step(Step::click(dialog.clone().locate(button("Close"))))
        .step(Step::assert_not_visible(dialog))
        .step(Step::hover(button("Hover me")))
        .step(Step::assert_visible(Locator::text("This is a tooltip!")))
        .step(Step::click(button("Show Toast")))
        .step(Step::assert_visible(Locator::text("Your message has been sent.")))
        .step(Step::click(trigger.clone()))
        .step(Step::assert_visible(popover.clone()))
        .step(Step::click(popover.clone().locate(Locator::text("Apple"))))
        .step(Step::assert_visible(trigger.locate(Locator::text("Apple"))))
        .step(Step::assert_css(popover, "opacity", "0"))
        .step(Step::assert_visible(
            Locator::label("Resizable Panel")
                .parent()
                .locate(Locator::css(".resizable")),
        ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{Action, Viewport};

    #[test]
    fn builtins_are_valid_and_distinct() {
        let all = scenarios(DEFAULT_DOCUMENT);
        let names: HashSet<_> = all.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names.len(), all.len());
        for scenario in &all {
            scenario.validate().unwrap();
            assert!(scenario.full_page, "{}", scenario.name);
        }
    }

    #[test]
    fn interactions_end_with_overlays_dismissed() {
        let s = interactions("index.html");
        assert_eq!(s.viewport, Viewport { width: 1280, height: 4000 });
        assert_eq!(s.artifact_file(), "interactions.png");

        let css_checks: Vec<_> = s
            .steps
            .iter()
            .filter_map(|step| match step {
                Step::AssertCss { target, property, expected, .. } => {
                    Some((target.to_string(), property.as_str(), expected.as_str()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            css_checks,
            [
                (r#"text="This is a tooltip!"i"#.to_string(), "opacity", "0"),
                ("css=.select-popover".to_string(), "opacity", "0"),
            ]
        );
        assert_eq!(s.steps.last(), Some(&Step::wait(1000)));
    }

    #[test]
    fn dialog_close_is_scoped_to_the_dialog() {
        let s = interactions("index.html");
        let close = s
            .steps
            .iter()
            .find_map(|step| match step {
                Step::Act { action: Action::Click, target, .. } if target.to_string().contains("Close") => {
                    Some(target.to_string())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(close, r#"role=dialog >> role=button[name="Close"s]"#);
    }

    #[test]
    fn select_option_checks_the_dialog_title_before_selecting() {
        let s = select_option("index.html");
        let labels: Vec<_> = s.steps.iter().map(|step| step.target().map(|t| t.to_string())).collect();
        let title = labels
            .iter()
            .position(|l| l.as_deref() == Some(r#"role=dialog >> role=heading[name="Dialog Title"s]"#))
            .unwrap();
        let apple = labels
            .iter()
            .position(|l| l.as_deref() == Some(r#"css=.select-popover >> text="Apple"i"#))
            .unwrap();
        assert!(title < apple);
        assert_eq!(s.steps.len(), 15);
    }

    #[test]
    fn page_structure_checks_five_sections() {
        let s = page_structure("index.html");
        assert_eq!(s.steps.len(), 5);
        assert!(s.steps.iter().all(|step| matches!(step, Step::AssertVisible { .. })));
    }
}
