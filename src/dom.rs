//! In-page scripts used by browser backends to resolve locators.
//!
//! Locators are serialized to JSON and interpreted by a small resolver that
//! runs inside the page, so every poll sees the document as it is right now.
//! Each script returns a JSON string; `parse_result` turns it back into one
//! of the typed results below.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::locator::Locator;
use crate::{Error, Result};

/// What a poll observed about the first element matching a locator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ElementState {
    /// Number of matching elements
    pub count: usize,
    /// Whether the first match is rendered (non-empty box, not `visibility: hidden`)
    pub visible: bool,
}

/// Result of checking whether an element can receive a pointer action
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActionTarget {
    NotFound,
    Hidden,
    Disabled,
    /// Another element receives pointer events at the element's centre
    Covered { by: String },
    /// Viewport coordinates of the element's centre, scrolled into view
    Ready { x: f64, y: f64 },
}

#[derive(Debug, Deserialize)]
struct StyleProbe {
    value: Option<String>,
}

/// Full scrollable size of the document in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DocumentSize {
    pub width: f64,
    pub height: f64,
}

const RESOLVER: &str = r#"
const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const textMatches = (value, expected, exact) => {
    const v = norm(value), e = norm(expected);
    return exact ? v === e : v.toLowerCase().includes(e.toLowerCase());
};
const SKIP = new Set(['script', 'style', 'head', 'title', 'noscript', 'template', 'meta', 'link']);
const NAME_FROM_CONTENT = new Set(['button', 'link', 'heading', 'cell', 'columnheader', 'rowheader',
    'option', 'tab', 'menuitem', 'checkbox', 'radio', 'switch', 'tooltip', 'treeitem', 'row']);

const implicitRole = (el) => {
    const tag = el.localName;
    switch (tag) {
        case 'button': return 'button';
        case 'a': case 'area': return el.hasAttribute('href') ? 'link' : null;
        case 'h1': case 'h2': case 'h3': case 'h4': case 'h5': case 'h6': return 'heading';
        case 'dialog': return 'dialog';
        case 'table': return 'table';
        case 'thead': case 'tbody': case 'tfoot': return 'rowgroup';
        case 'tr': return 'row';
        case 'td': return 'cell';
        case 'th': return el.getAttribute('scope') === 'row' ? 'rowheader' : 'columnheader';
        case 'img': return el.getAttribute('alt') === '' ? 'presentation' : 'img';
        case 'textarea': return 'textbox';
        case 'select': return (el.multiple || el.size > 1) ? 'listbox' : 'combobox';
        case 'option': return 'option';
        case 'ul': case 'ol': case 'menu': return 'list';
        case 'li': return 'listitem';
        case 'nav': return 'navigation';
        case 'main': return 'main';
        case 'header': return 'banner';
        case 'footer': return 'contentinfo';
        case 'aside': return 'complementary';
        case 'form': return 'form';
        case 'article': return 'article';
        case 'section': return (el.hasAttribute('aria-label') || el.hasAttribute('aria-labelledby')) ? 'region' : null;
        case 'hr': return 'separator';
        case 'progress': return 'progressbar';
        case 'meter': return 'meter';
        case 'p': return 'paragraph';
        case 'fieldset': case 'details': return 'group';
        case 'input': {
            const type = (el.getAttribute('type') || 'text').toLowerCase();
            switch (type) {
                case 'button': case 'submit': case 'reset': case 'image': return 'button';
                case 'checkbox': return 'checkbox';
                case 'radio': return 'radio';
                case 'range': return 'slider';
                case 'number': return 'spinbutton';
                case 'search': return 'searchbox';
                case 'hidden': case 'file': case 'color': case 'date': case 'password': return null;
                default: return 'textbox';
            }
        }
        default: return null;
    }
};

const roleOf = (el) => {
    const explicit = norm(el.getAttribute('role')).split(' ')[0];
    return explicit || implicitRole(el);
};

// Rendered text under `el`; script, style and template contents never count.
const visibleText = (el) => {
    if (SKIP.has(el.localName)) return '';
    const walker = document.createTreeWalker(el, NodeFilter.SHOW_ELEMENT | NodeFilter.SHOW_TEXT, {
        acceptNode: (n) => n.nodeType !== 1 ? NodeFilter.FILTER_ACCEPT
            : SKIP.has(n.localName) ? NodeFilter.FILTER_REJECT : NodeFilter.FILTER_SKIP,
    });
    let out = '';
    for (let n = walker.nextNode(); n; n = walker.nextNode()) out += n.data;
    return out;
};

const labelText = (el) => {
    const parts = [];
    if (el.labels) {
        for (const label of el.labels) parts.push(norm(visibleText(label)));
    }
    return parts.join(' ');
};

const accessibleName = (el) => {
    const labelledBy = el.getAttribute('aria-labelledby');
    if (labelledBy) {
        const text = labelledBy.split(/\s+/)
            .map((id) => document.getElementById(id))
            .filter(Boolean)
            .map((n) => norm(visibleText(n)))
            .join(' ');
        if (text) return text;
    }
    const ariaLabel = norm(el.getAttribute('aria-label'));
    if (ariaLabel) return ariaLabel;
    const tag = el.localName;
    if (tag === 'input' || tag === 'textarea' || tag === 'select') {
        const type = (el.getAttribute('type') || '').toLowerCase();
        if (['button', 'submit', 'reset'].includes(type)) return norm(el.value);
        if (type === 'image') return norm(el.getAttribute('alt'));
        const fromLabel = labelText(el);
        if (fromLabel) return fromLabel;
        return norm(el.getAttribute('placeholder') || el.getAttribute('title'));
    }
    if (tag === 'img') return norm(el.getAttribute('alt') || el.getAttribute('title'));
    if (NAME_FROM_CONTENT.has(roleOf(el))) {
        const text = norm(visibleText(el));
        if (text) return text;
    }
    return norm(el.getAttribute('title'));
};

const hiddenFromTree = (el) => {
    for (let n = el; n && n.nodeType === 1; n = n.parentElement) {
        if (n.getAttribute('aria-hidden') === 'true') return true;
        if (getComputedStyle(n).display === 'none') return true;
    }
    return getComputedStyle(el).visibility !== 'visible';
};

const isVisible = (el) => {
    if (!el || !el.isConnected) return false;
    if (getComputedStyle(el).visibility !== 'visible') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
};

// A scope element is itself a candidate; the document is not.
const candidates = (root) => (root.nodeType === 1 ? [root] : [])
    .concat(Array.from(root.querySelectorAll('*')))
    .filter((el) => !SKIP.has(el.localName));

const uniqueInOrder = (els) => {
    const set = new Set(els);
    const out = Array.from(set);
    out.sort((a, b) => a === b ? 0 : (a.compareDocumentPosition(b) & Node.DOCUMENT_POSITION_FOLLOWING ? -1 : 1));
    return out;
};

const innermost = (els) => els.filter((el) => !els.some((other) => other !== el && el.contains(other)));

const ownText = (el) => {
    const tag = el.localName;
    if (tag === 'input') {
        const type = (el.getAttribute('type') || '').toLowerCase();
        if (['button', 'submit', 'reset'].includes(type)) return el.value;
    }
    return visibleText(el);
};

const resolveIn = (loc, root) => {
    switch (loc.by) {
        case 'css':
            return Array.from(root.querySelectorAll(loc.selector));
        case 'role':
            return candidates(root).filter((el) => roleOf(el) === loc.role
                && !hiddenFromTree(el)
                && (loc.name == null || textMatches(accessibleName(el), loc.name, loc.exact)));
        case 'text':
            return innermost(candidates(root).filter((el) => textMatches(ownText(el), loc.text, loc.exact)));
        case 'label': {
            const out = [];
            for (const el of candidates(root)) {
                if (el.localName === 'label' && textMatches(visibleText(el), loc.label, loc.exact) && el.control) {
                    out.push(el.control);
                } else if (el.hasAttribute('aria-label') && textMatches(el.getAttribute('aria-label'), loc.label, loc.exact)) {
                    out.push(el);
                }
            }
            return out;
        }
        default:
            throw new Error('unknown locator kind ' + loc.by);
    }
};

const resolve = (loc, roots) => {
    switch (loc.by) {
        case 'within':
            return resolve(loc.inner, resolve(loc.scope, roots));
        case 'parent':
            return uniqueInOrder(resolve(loc.of, roots).map((el) => el.parentElement).filter(Boolean));
        case 'nth': {
            const all = resolve(loc.of, roots);
            return loc.index < all.length ? [all[loc.index]] : [];
        }
        default:
            return uniqueInOrder(roots.flatMap((root) => resolveIn(loc, root)));
    }
};

const describe = (el) => {
    if (!el) return 'nothing';
    let out = el.localName;
    if (el.id) out += '#' + el.id;
    for (const cls of Array.from(el.classList).slice(0, 3)) out += '.' + cls;
    return out;
};
"#;

const WRAPPER: &str = r#"(function(){
    try {
        {{RESOLVER}}
        const loc = {{LOCATOR}};
        const found = resolve(loc, [document]);
        {{BODY}}
    } catch (e) {
        return JSON.stringify({ error: String(e) });
    }
})()"#;

const QUERY_BODY: &str = r#"
        return JSON.stringify({ count: found.length, visible: isVisible(found[0]) });
"#;

const STYLE_BODY: &str = r#"
        const prop = {{PROPERTY}}.replace(/[A-Z]/g, (m) => '-' + m.toLowerCase());
        if (!found.length) return JSON.stringify({ value: null });
        return JSON.stringify({ value: getComputedStyle(found[0]).getPropertyValue(prop) });
"#;

const TARGET_BODY: &str = r#"
        const el = found[0];
        if (!el) return JSON.stringify({ state: 'not_found' });
        if (!isVisible(el)) return JSON.stringify({ state: 'hidden' });
        if ({{CHECK_ENABLED}} && (el.matches(':disabled') || el.closest('[aria-disabled="true"]'))) {
            return JSON.stringify({ state: 'disabled' });
        }
        el.scrollIntoView({ block: 'center', inline: 'center', behavior: 'instant' });
        const rect = el.getBoundingClientRect();
        const x = rect.left + rect.width / 2;
        const y = rect.top + rect.height / 2;
        const hit = document.elementFromPoint(x, y);
        if (!hit || !(hit === el || el.contains(hit))) {
            return JSON.stringify({ state: 'covered', by: describe(hit) });
        }
        return JSON.stringify({ state: 'ready', x: x, y: y });
"#;

/// Script reporting the full scrollable document size
pub const DOCUMENT_SIZE_SCRIPT: &str = r#"(function(){
    const d = document.documentElement, b = document.body;
    const width = Math.max(d.scrollWidth, b ? b.scrollWidth : 0, d.clientWidth);
    const height = Math.max(d.scrollHeight, b ? b.scrollHeight : 0, d.clientHeight);
    return JSON.stringify({ width: width, height: height });
})()"#;

fn build(locator: &Locator, body: &str) -> Result<String> {
    locator.validate()?;
    let json = serde_json::to_string(locator)?;
    Ok(WRAPPER
        .replace("{{BODY}}", body)
        .replace("{{RESOLVER}}", RESOLVER)
        .replace("{{LOCATOR}}", &json))
}

/// Script returning an [`ElementState`] for `locator`
pub fn query_script(locator: &Locator) -> Result<String> {
    build(locator, QUERY_BODY)
}

/// Script returning the computed value of `property` on the first match
pub fn style_script(locator: &Locator, property: &str) -> Result<String> {
    validate_property(property)?;
    let property = serde_json::to_string(property)?;
    build(locator, &STYLE_BODY.replace("{{PROPERTY}}", &property))
}

/// Script returning an [`ActionTarget`] for `locator`. Hover skips the
/// enabled check, click does not.
pub fn target_script(locator: &Locator, check_enabled: bool) -> Result<String> {
    let check = if check_enabled { "true" } else { "false" };
    build(locator, &TARGET_BODY.replace("{{CHECK_ENABLED}}", check))
}

/// CSS property names are plain identifiers (`opacity`, `background-color`,
/// `backgroundColor`); anything else is a configuration mistake.
pub fn validate_property(property: &str) -> Result<()> {
    let valid = !property.is_empty()
        && property
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::ConfigError(format!("Invalid CSS property name {:?}", property)))
    }
}

/// Parse the JSON string produced by one of the scripts above
pub fn parse_result<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| Error::ScriptError(format!("Unreadable script result {:?}: {}", raw, e)))?;
    if let Some(err) = value.get("error") {
        let msg = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Err(Error::ScriptError(msg));
    }
    serde_json::from_value(value).map_err(Error::from)
}

/// Parse the result of [`style_script`]
pub fn parse_style(raw: &str) -> Result<Option<String>> {
    parse_result::<StyleProbe>(raw).map(|probe| probe.value)
}
