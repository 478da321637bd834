//! HTML pages served by `GET /verify`
//!
//! Every member-provided value goes through [`escape_html`].

use crate::config::Settings;
use crate::email::escape_html;
use crate::identity::IdentityRecord;

const STYLE: &str = "\
body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Arial,sans-serif;\
background:linear-gradient(135deg,#667eea 0%,#764ba2 100%);min-height:100vh;margin:0;\
display:flex;align-items:center;justify-content:center;padding:20px;box-sizing:border-box}\
.container{background:#fff;border-radius:16px;box-shadow:0 20px 60px rgba(0,0,0,.3);\
max-width:500px;width:100%;padding:40px;text-align:center}\
.logo{font-size:48px;margin-bottom:10px}h1{color:#333;font-size:26px}p{color:#666}\
.info{background:#f7f7f7;padding:15px;border-radius:8px;margin:20px 0;text-align:left}\
select,button{width:100%;padding:12px;border-radius:8px;font-size:16px;margin-top:10px}\
button{background:#667eea;color:#fff;border:none;cursor:pointer}\
button:disabled{background:#ccc}\
.badge{display:inline-block;background:#667eea;color:#fff;padding:8px 20px;border-radius:20px}\
#ok,#err{display:none;margin-top:20px;padding:12px;border-radius:8px}\
#ok{background:#d4edda;color:#155724}#err{background:#f8d7da;color:#721c24}";

const SUBMIT_SCRIPT: &str = r#"<script>
document.getElementById('verifyForm').addEventListener('submit', async (e) => {
  e.preventDefault();
  const form = e.target;
  const btn = document.getElementById('submitBtn');
  const ok = document.getElementById('ok');
  const err = document.getElementById('err');
  const team = form.team ? form.team.value : null;
  if (form.team && !team) {
    err.textContent = 'Please select a team';
    err.style.display = 'block';
    return;
  }
  btn.disabled = true;
  err.style.display = 'none';
  try {
    const response = await fetch('/api/verify', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ code: form.code.value, team }),
    });
    if (!response.ok) {
      throw new Error((await response.text()) || 'Verification failed');
    }
    const data = await response.json();
    ok.textContent = data.message;
    ok.style.display = 'block';
    form.style.display = 'none';
  } catch (error) {
    err.textContent = error.message;
    err.style.display = 'block';
    btn.disabled = false;
  }
});
</script>"#;

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{}</title>\n<style>{}</style>\n</head>\n<body>\n<div class=\"container\">\n{}\n\
         </div>\n</body>\n</html>\n",
        escape_html(title),
        STYLE,
        body
    )
}

/// Form for a pending record: team picker, or a confirm button when team
/// selection is disabled
pub fn verification_page(record: &IdentityRecord, code: &str, settings: &Settings) -> String {
    let picker = if settings.team_selection {
        let options: String = settings
            .teams
            .iter()
            .map(|team| {
                let name = escape_html(&team.name);
                format!("<option value=\"{0}\">{0}</option>", name)
            })
            .collect();
        format!(
            "<label for=\"team\">Select Your Team:</label>\n\
             <select id=\"team\" name=\"team\" required>\n\
             <option value=\"\">-- Choose a team --</option>{}</select>\n",
            options
        )
    } else {
        String::new()
    };

    let body = format!(
        "<div class=\"logo\">🛡️</div>\n<h1>Verify Your Account</h1>\n\
         <p>Complete your verification to access the server</p>\n\
         <div class=\"info\"><p><strong>Account:</strong> {name}</p>\
         <p><strong>Email:</strong> {email}</p></div>\n\
         <form id=\"verifyForm\">\n<input type=\"hidden\" name=\"code\" value=\"{code}\">\n\
         {picker}<button type=\"submit\" id=\"submitBtn\">Complete Verification</button>\n</form>\n\
         <div id=\"ok\"></div><div id=\"err\"></div>\n{script}",
        name = escape_html(&record.display_name),
        email = escape_html(&record.email),
        code = escape_html(code),
        picker = picker,
        script = SUBMIT_SCRIPT,
    );
    page("Verify Your Account", &body)
}

/// Page for a record that is already verified
pub fn already_verified_page(record: &IdentityRecord) -> String {
    let badge = record
        .team()
        .map(|team| format!("<div class=\"badge\">{}</div>\n", escape_html(team)))
        .unwrap_or_default();
    let body = format!(
        "<div class=\"logo\">✅</div>\n<h1>Already Verified</h1>\n\
         <p>Your account has already been verified.</p>\n{}\
         <p>You can close this page and return to the server.</p>",
        badge
    );
    page("Already Verified", &body)
}

/// Page for a restricted record
pub fn restricted_page() -> String {
    page(
        "Access Restricted",
        "<div class=\"logo\">⚠️</div>\n<h1>Access Restricted</h1>\n\
         <p>Your access has been temporarily restricted. \
         Please contact a moderator to reactivate your account.</p>",
    )
}
