use ledgerlink_core::LinkToken;

use crate::server::Flow;

const TOKEN_PLACEHOLDER: &str = "__LINK_TOKEN__";
const CALLBACK_PLACEHOLDER: &str = "__CALLBACK_PATH__";

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>ledgerlink</title>
    <style>
      .done {
        font-size: 1.2em;
        font-family: Arial, Helvetica, sans-serif;
        background-color: #2e7d32;
        color: #fff;
        display: flex;
        justify-content: center;
        align-items: center;
        border-radius: 15px;
        width: 100%;
        height: 100%;
      }
      .hidden { visibility: hidden; }
    </style>
  </head>
  <body>
    <div id="done" class="done hidden">
      <div>
        <h2>All done here!</h2>
        <p>You can close this window and go back to ledgerlink.</p>
      </div>
    </div>
    <script src="https://cdn.plaid.com/link/v2/stable/link-initialize.js"></script>
    <script type="text/javascript">
      const callback = __CALLBACK_PATH__;
      function report(fields) {
        fetch(callback, { method: "POST", body: new URLSearchParams(fields) })
          .finally(() => document.getElementById("done").classList.remove("hidden"));
      }
      function describe(err) {
        return err.display_message || err.error_message || err.error_code || JSON.stringify(err);
      }
"#;

const LINK_SCRIPT: &str = r#"
      Plaid.create({
        token: __LINK_TOKEN__,
        onSuccess: (public_token, metadata) => report({ public_token: public_token }),
        onExit: (err, metadata) => report({ error: err ? describe(err) : "exited before linking an institution" }),
      }).open();
"#;

// Update mode keeps the existing access token, so nothing is exchanged; a
// clean exit counts as success.
const RELINK_SCRIPT: &str = r#"
      Plaid.create({
        token: __LINK_TOKEN__,
        onSuccess: (public_token, metadata) => report({}),
        onExit: (err, metadata) => report(err ? { error: describe(err) } : {}),
      }).open();
"#;

const PAGE_TAIL: &str = r#"    </script>
  </body>
</html>
"#;

/// Renders the page that hosts the aggregator's link widget for `flow`.
pub fn render(flow: Flow, token: &LinkToken) -> String {
    let script = match flow {
        Flow::Link => LINK_SCRIPT,
        Flow::Relink => RELINK_SCRIPT,
    };
    let mut page = String::with_capacity(PAGE_HEAD.len() + script.len() + PAGE_TAIL.len());
    page.push_str(PAGE_HEAD);
    page.push_str(script);
    page.push_str(PAGE_TAIL);
    page.replace(CALLBACK_PLACEHOLDER, &js_string(flow.path()))
        .replace(TOKEN_PLACEHOLDER, &js_string(token.as_str()))
}

/// A JSON string literal that is also safe inside a `<script>` element.
fn js_string(s: &str) -> String {
    serde_json::Value::from(s).to_string().replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_page_embeds_token_and_callback() {
        let html = render(Flow::Link, &LinkToken::new("link-sandbox-abc"));
        assert!(html.contains(r#"token: "link-sandbox-abc""#));
        assert!(html.contains(r#"const callback = "/link";"#));
        assert!(html.contains("public_token: public_token"));
        assert!(!html.contains(TOKEN_PLACEHOLDER));
    }

    #[test]
    fn relink_page_posts_to_relink() {
        let html = render(Flow::Relink, &LinkToken::new("link-2"));
        assert!(html.contains(r#"const callback = "/relink";"#));
        assert!(!html.contains("public_token: public_token"));
    }

    #[test]
    fn token_cannot_break_out_of_script() {
        let html = render(Flow::Link, &LinkToken::new("x\"</script><script>alert(1)"));
        assert!(!html.contains("</script><script>alert"));
        assert!(html.contains(r#"x\"<\/script>"#));
    }
}
