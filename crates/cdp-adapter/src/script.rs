//! Page-side helpers evaluated inside each frame's isolated world.
//!
//! Elements are addressed by a `data-dp-ref` attribute stamped on first
//! sight. Every helper returns `{ ok }`, `{ stale: true }` when the referenced
//! node is gone, or `{ error }`.

use serde_json::Value;

use crate::error::{AdapterError, AdapterErrorKind};

pub(crate) const REF_ATTRIBUTE: &str = "data-dp-ref";

const PRELUDE: &str = r#"function () {
  const ATTR = 'data-dp-ref';
  const prefix = Math.random().toString(36).slice(2, 8);
  let seq = 0;
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const stamp = (el) => {
    let ref = el.getAttribute(ATTR);
    if (!ref) {
      seq += 1;
      ref = prefix + '-' + seq;
      el.setAttribute(ATTR, ref);
    }
    return ref;
  };
  const byRef = (ref) => (ref ? document.querySelector('[' + ATTR + '="' + ref + '"]') : null);
  const IMPLICIT = {
    button: 'button, input[type="button"], input[type="submit"], input[type="reset"]',
    textbox: 'input:not([type]), input[type="text"], input[type="search"], input[type="email"], input[type="tel"], input[type="url"], input[type="password"], textarea',
    combobox: 'select',
    link: 'a[href]',
    option: 'option',
    listitem: 'li',
    heading: 'h1, h2, h3, h4, h5, h6',
    row: 'tr',
    cell: 'td',
  };
  const ownText = (el) => norm(el.innerText || el.textContent);
  const accessibleName = (el) => {
    const aria = el.getAttribute('aria-label');
    if (aria) return norm(aria);
    const labelledBy = el.getAttribute('aria-labelledby');
    if (labelledBy) {
      const text = labelledBy.split(/\s+/).map((id) => {
        const node = document.getElementById(id);
        return node ? node.textContent : '';
      }).join(' ');
      if (norm(text)) return norm(text);
    }
    if (el.id) {
      const label = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
      if (label) return norm(label.textContent);
    }
    const wrapping = el.closest('label');
    if (wrapping) return norm(wrapping.textContent);
    if (el.getAttribute('placeholder')) return norm(el.getAttribute('placeholder'));
    if (el.getAttribute('title')) return norm(el.getAttribute('title'));
    return ownText(el);
  };
  const query = (args) => {
    let root = document;
    if (args.scope) {
      root = byRef(args.scope);
      if (!root) return { stale: true };
    }
    const anchor = args.anchor;
    let found = [];
    if (anchor.by === 'css') {
      try {
        found = Array.from(root.querySelectorAll(anchor.value));
      } catch (err) {
        return { error: 'invalid selector: ' + anchor.value };
      }
    } else if (anchor.by === 'aria') {
      const role = anchor.value.role.toLowerCase();
      const name = norm(anchor.value.name).toLowerCase();
      const selector = '[role="' + role + '"]' + (IMPLICIT[role] ? ', ' + IMPLICIT[role] : '');
      found = Array.from(root.querySelectorAll(selector)).filter((el) => {
        const explicit = el.getAttribute('role');
        if (explicit && explicit.toLowerCase() !== role) return false;
        return accessibleName(el).toLowerCase() === name;
      });
    } else if (anchor.by === 'text') {
      const want = norm(anchor.value.content);
      const exact = anchor.value.exact;
      const matches = (el) => {
        if (['SCRIPT', 'STYLE', 'TEMPLATE', 'HEAD'].includes(el.tagName)) return false;
        const text = ownText(el);
        return exact ? text === want : text.includes(want);
      };
      found = Array.from(root.querySelectorAll('*'))
        .filter((el) => matches(el) && !Array.from(el.children).some(matches));
    }
    return { ok: found.map(stamp) };
  };
  const withElement = (args, fn) => {
    const el = byRef(args.element);
    if (!el || !el.isConnected) return { stale: true };
    return fn(el);
  };
  const setValue = (el, value) => {
    let proto = null;
    if (el instanceof HTMLTextAreaElement) proto = HTMLTextAreaElement.prototype;
    else if (el instanceof HTMLInputElement) proto = HTMLInputElement.prototype;
    if (proto) {
      Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value);
    } else if (el.isContentEditable) {
      el.textContent = value;
    } else {
      return false;
    }
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
  };
  const ops = {
    query,
    closest: (args) => withElement(args, (el) => {
      let hit = null;
      try {
        hit = el.closest(args.css);
      } catch (err) {
        return { error: 'invalid selector: ' + args.css };
      }
      return { ok: hit ? stamp(hit) : null };
    }),
    text: (args) => withElement(args, (el) => ({ ok: ownText(el) })),
    value: (args) => withElement(args, (el) => ({
      ok: typeof el.value === 'string' ? el.value : norm(el.textContent),
    })),
    interactable: (args) => withElement(args, (el) => {
      const style = window.getComputedStyle(el);
      if (el.disabled || style.display === 'none' || style.visibility === 'hidden') {
        return { ok: false };
      }
      const rect = el.getBoundingClientRect();
      return { ok: rect.width > 0 && rect.height > 0 };
    }),
    fill: (args) => withElement(args, (el) => {
      if (typeof el.focus === 'function') el.focus();
      return setValue(el, args.value) ? { ok: true } : { error: 'element is not editable' };
    }),
    clear: (args) => withElement(args, (el) => {
      if (typeof el.focus === 'function') el.focus();
      return setValue(el, '') ? { ok: true } : { error: 'element is not editable' };
    }),
    focus: (args) => withElement(args, (el) => {
      if (typeof el.focus === 'function') el.focus();
      return { ok: true };
    }),
    center: (args) => withElement(args, (el) => {
      el.scrollIntoView({ block: 'center', inline: 'center' });
      const rect = el.getBoundingClientRect();
      return { ok: { x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 } };
    }),
    click: (args) => withElement(args, (el) => {
      const init = { bubbles: true, cancelable: true, view: window };
      el.dispatchEvent(new PointerEvent('pointerdown', init));
      el.dispatchEvent(new MouseEvent('mousedown', init));
      el.dispatchEvent(new PointerEvent('pointerup', init));
      el.dispatchEvent(new MouseEvent('mouseup', init));
      el.click();
      return { ok: true };
    }),
  };
  return {
    run: (op, args) => {
      const fn = ops[op];
      if (!fn) return { error: 'unknown op ' + op };
      try {
        return fn(args || {});
      } catch (err) {
        return { error: String(err && err.message ? err.message : err) };
      }
    },
  };
}"#;

/// Expression calling one helper with JSON arguments.
pub(crate) fn call(op: &str, args: &Value) -> String {
    format!(
        "(() => {{ const dp = globalThis.__dashprobe || (globalThis.__dashprobe = ({prelude})()); return dp.run({op}, {args}); }})()",
        prelude = PRELUDE,
        op = Value::String(op.to_string()),
        args = args,
    )
}

/// Unwrap the `{ ok | stale | error }` envelope returned by a helper.
pub(crate) fn outcome(op: &str, value: Value) -> Result<Value, AdapterError> {
    if value.get("stale").and_then(Value::as_bool).unwrap_or(false) {
        return Err(AdapterError::stale(format!("{op}: element no longer attached")));
    }
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(AdapterError::new(AdapterErrorKind::Script).with_hint(format!("{op}: {error}")));
    }
    match value {
        Value::Object(mut map) => Ok(map.remove("ok").unwrap_or(Value::Null)),
        other => Err(AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("{op}: unexpected helper result {other}"))),
    }
}
