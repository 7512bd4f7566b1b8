//! HTML bodies for the post-upload notifications.

pub const REQUEST_RECEIVED_SUBJECT: &str = "Request Received - 1dS Model Processing";

pub fn data_received_subject(submitter_name: &str) -> String {
    format!("Data Received for user {}", submitter_name)
}

/// Download links for one submission, served by the backend under `/projects/<submission_id>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLinks {
    pub processor_zip: String,
    pub raw_data: String,
    pub results_email_form: String,
}

impl DownloadLinks {
    pub fn new(base_url: &str, submission_id: &str) -> Self {
        let base = format!(
            "{}/projects/{}",
            base_url.trim_end_matches('/'),
            submission_id
        );
        Self {
            processor_zip: format!("{}/processor_zip", base),
            raw_data: format!("{}/raw_data", base),
            results_email_form: format!("{}/results_email_form", base),
        }
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn link(href: &str) -> String {
    let href = escape_html(href);
    format!(r#"<a href="{0}" target="_blank">{0}</a>"#, href)
}

pub fn signature() -> &'static str {
    r#"<div>
    <p style="line-height:2;">--</p>
    <p style="font-size:8pt; font-family:sans-serif; line-height:0.4;">Seismic Processing Team</p>
    <p style="font-size:7pt; font-family:sans-serif; color:#CCCCCC; line-height:2;">
        This email and any files transmitted with it are confidential and intended solely for the
        addressee. If you received it in error, please notify the sender and delete it.
    </p>
</div>"#
}

/// Acknowledgement sent to the submitter.
pub fn request_received(name: &str) -> String {
    format!(
        r#"<html>
<head></head>
<body>
    <p>Hello {name},</p>
    <p>Thank you for your request! We've received your data and will return your 1dS model shortly, including depth, layer thickness and velocity details.</p>
    <p>If you have any questions in the meantime, please feel free to reach out.</p>
    <p>Best regards,<br>Support Team</p>
    {signature}
</body>
</html>
"#,
        name = escape_html(name),
        signature = signature()
    )
}

/// Internal notice with the download links and the created project.
pub fn data_received(name: &str, email: &str, project_id: &str, links: &DownloadLinks) -> String {
    format!(
        r#"<html>
<head></head>
<body>
    <p>Data has been received from {name} at {email}.</p>
    <p>Backend project: {project_id}</p>
    <p>Links:</p>
    <p>(zip links may need to be copy-pasted in your browser)</p>
    <p>Processor zip: {processor}</p>
    <p>Raw data zip: {raw}</p>
    <p>Email form: {form}</p>
    {signature}
</body>
</html>
"#,
        name = escape_html(name),
        email = escape_html(email),
        project_id = escape_html(project_id),
        processor = link(&links.processor_zip),
        raw = link(&links.raw_data),
        form = link(&links.results_email_form),
        signature = signature()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_follow_project_layout() {
        let links = DownloadLinks::new("https://dl.example.com/", "20260101-000000-000000-abc");
        assert_eq!(
            links.processor_zip,
            "https://dl.example.com/projects/20260101-000000-000000-abc/processor_zip"
        );
        assert!(links.raw_data.ends_with("/raw_data"));
        assert!(links.results_email_form.ends_with("/results_email_form"));
    }

    #[test]
    fn bodies_escape_submitter_input() {
        let body = request_received("<script>alert(1)</script>");
        assert!(body.contains("&lt;script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[test]
    fn data_received_lists_links_and_project() {
        let links = DownloadLinks::new("http://localhost:8000", "sub-1");
        let body = data_received("Jane Doe", "jane@example.com", "p-42", &links);
        assert!(body.contains("Jane Doe"));
        assert!(body.contains("p-42"));
        assert!(body.contains(r#"href="http://localhost:8000/projects/sub-1/raw_data""#));
        assert!(body.contains(signature()));
        assert_eq!(data_received_subject("Jane Doe"), "Data Received for user Jane Doe");
    }
}
