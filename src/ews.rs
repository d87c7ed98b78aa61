use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use url::Url;

use crate::error::FetchError;

/// Raw attachment content pulled from the mailbox store. Held only for
/// the lifetime of one classification request, never persisted.
#[derive(Debug, Clone)]
pub struct AttachmentContent {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Capability for retrieving attachment content on behalf of a caller.
/// The production implementation speaks EWS; tests substitute an
/// in-memory source.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    async fn fetch(
        &self,
        token: &str,
        endpoint: &str,
        ids: &[String],
    ) -> Result<Vec<AttachmentContent>, FetchError>;
}

/// EWS attachment fetcher. Issues a single batched GetAttachment SOAP
/// request with full MIME content, authenticated by the caller-supplied
/// bearer token against the caller-supplied endpoint. The endpoint is a
/// capability handed over by the trusted front-end; token scope is the
/// enforcement boundary, so it is parsed for well-formedness only.
pub struct EwsClient {
    client: Client,
    timeout_seconds: u64,
}

impl EwsClient {
    pub fn new(timeout_seconds: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("tlp-guard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(EwsClient {
            client,
            timeout_seconds,
        })
    }
}

#[async_trait]
impl AttachmentSource for EwsClient {
    async fn fetch(
        &self,
        token: &str,
        endpoint: &str,
        ids: &[String],
    ) -> Result<Vec<AttachmentContent>, FetchError> {
        let endpoint = Url::parse(endpoint)?;
        log::debug!(
            "Requesting {} attachment(s) from {} (timeout {}s)",
            ids.len(),
            endpoint,
            self.timeout_seconds
        );

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(build_get_attachment_request(ids))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ServiceFailure(format!(
                "attachment service returned {status}"
            )));
        }

        let body = response.text().await?;
        parse_get_attachment_response(&body)
    }
}

/// Builds the GetAttachment SOAP envelope for a batch of attachment IDs,
/// requesting full MIME content for each.
pub fn build_get_attachment_request(ids: &[String]) -> String {
    let mut attachment_ids = String::new();
    for id in ids {
        attachment_ids.push_str("<t:AttachmentId Id=\"");
        attachment_ids.push_str(&quick_xml::escape::escape(id.as_str()));
        attachment_ids.push_str("\"/>");
    }

    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
            "<soap:Envelope xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"",
            " xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\"",
            " xmlns:m=\"http://schemas.microsoft.com/exchange/services/2006/messages\"",
            " xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"",
            " xmlns:t=\"http://schemas.microsoft.com/exchange/services/2006/types\">",
            "<soap:Header>",
            "<RequestServerVersion Version=\"Exchange2013\"",
            " xmlns=\"http://schemas.microsoft.com/exchange/services/2006/types\"",
            " soap:mustUnderstand=\"0\"/>",
            "</soap:Header>",
            "<soap:Body>",
            "<m:GetAttachment>",
            "<m:AttachmentShape><t:IncludeMimeContent>true</t:IncludeMimeContent></m:AttachmentShape>",
            "<m:AttachmentIds>{ids}</m:AttachmentIds>",
            "</m:GetAttachment>",
            "</soap:Body>",
            "</soap:Envelope>",
        ),
        ids = attachment_ids
    )
}

/// Parses a GetAttachment SOAP response. File attachments with non-empty
/// base64 content become one `AttachmentContent` each; item attachments
/// carry no binary content and are skipped. Any response message with
/// `ResponseClass="Error"` fails the whole batch, mirroring the worst-of
/// overall result the EWS managed API reports.
pub fn parse_get_attachment_response(xml: &str) -> Result<Vec<AttachmentContent>, FetchError> {
    #[derive(PartialEq)]
    enum Field {
        Outside,
        Name,
        Content,
        MessageText,
    }

    let mut reader = Reader::from_str(xml);
    let mut attachments = Vec::new();
    let mut in_file_attachment = false;
    let mut field = Field::Outside;
    let mut name = String::new();
    let mut content = String::new();
    let mut error_message: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref element) => match element.local_name().as_ref() {
                b"GetAttachmentResponseMessage" => {
                    if response_class(element).as_deref() == Some("Error")
                        && error_message.is_none()
                    {
                        error_message = Some(String::new());
                    }
                }
                b"FileAttachment" => {
                    in_file_attachment = true;
                    name.clear();
                    content.clear();
                }
                b"Name" if in_file_attachment => field = Field::Name,
                b"Content" if in_file_attachment => field = Field::Content,
                b"MessageText" => field = Field::MessageText,
                _ => {}
            },
            Event::Text(ref text) => {
                let text = text.unescape()?;
                match field {
                    Field::Name => name.push_str(&text),
                    Field::Content => content.push_str(&text),
                    Field::MessageText => {
                        if let Some(message) = error_message.as_mut() {
                            message.push_str(&text);
                        }
                    }
                    Field::Outside => {}
                }
            }
            Event::End(ref element) => match element.local_name().as_ref() {
                b"FileAttachment" => {
                    if !content.is_empty() {
                        attachments.push(AttachmentContent {
                            name: std::mem::take(&mut name),
                            bytes: decode_content(&content)?,
                        });
                    } else {
                        log::debug!("Skipping attachment {} without binary content", name);
                    }
                    in_file_attachment = false;
                }
                b"Name" | b"Content" | b"MessageText" => field = Field::Outside,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(message) = error_message {
        let message = if message.is_empty() {
            "unspecified error".to_string()
        } else {
            message
        };
        return Err(FetchError::ServiceFailure(message));
    }

    Ok(attachments)
}

fn response_class(element: &BytesStart<'_>) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"ResponseClass")
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn decode_content(content: &str) -> Result<Vec<u8>, FetchError> {
    // EWS wraps base64 content across lines.
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(BASE64_STANDARD.decode(compact.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(body: &str) -> String {
        format!(
            concat!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
                "<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\">",
                "<s:Body>",
                "<m:GetAttachmentResponse",
                " xmlns:m=\"http://schemas.microsoft.com/exchange/services/2006/messages\"",
                " xmlns:t=\"http://schemas.microsoft.com/exchange/services/2006/types\">",
                "<m:ResponseMessages>{body}</m:ResponseMessages>",
                "</m:GetAttachmentResponse>",
                "</s:Body>",
                "</s:Envelope>",
            ),
            body = body
        )
    }

    fn file_attachment(name: &str, bytes: &[u8]) -> String {
        format!(
            concat!(
                "<m:GetAttachmentResponseMessage ResponseClass=\"Success\">",
                "<m:ResponseCode>NoError</m:ResponseCode>",
                "<m:Attachments>",
                "<t:FileAttachment>",
                "<t:AttachmentId Id=\"AAMk=\"/>",
                "<t:Name>{name}</t:Name>",
                "<t:Content>{content}</t:Content>",
                "</t:FileAttachment>",
                "</m:Attachments>",
                "</m:GetAttachmentResponseMessage>",
            ),
            name = name,
            content = BASE64_STANDARD.encode(bytes)
        )
    }

    #[test]
    fn test_request_contains_each_id() {
        let ids = vec!["first".to_string(), "second".to_string()];
        let request = build_get_attachment_request(&ids);
        assert!(request.contains("<t:AttachmentId Id=\"first\"/>"));
        assert!(request.contains("<t:AttachmentId Id=\"second\"/>"));
        assert!(request.contains("<t:IncludeMimeContent>true</t:IncludeMimeContent>"));
    }

    #[test]
    fn test_request_escapes_ids() {
        let ids = vec!["a\"b<c>&d".to_string()];
        let request = build_get_attachment_request(&ids);
        assert!(request.contains("a&quot;b&lt;c&gt;&amp;d"));
        assert!(!request.contains("a\"b<c>"));
    }

    #[test]
    fn test_parse_file_attachment() {
        let xml = response_with(&file_attachment("report.docx", b"package bytes"));
        let attachments = parse_get_attachment_response(&xml).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].name, "report.docx");
        assert_eq!(attachments[0].bytes, b"package bytes");
    }

    #[test]
    fn test_parse_skips_item_attachments() {
        let body = format!(
            concat!(
                "<m:GetAttachmentResponseMessage ResponseClass=\"Success\">",
                "<m:Attachments>",
                "<t:ItemAttachment><t:Name>Forwarded message</t:Name></t:ItemAttachment>",
                "</m:Attachments>",
                "</m:GetAttachmentResponseMessage>",
                "{file}",
            ),
            file = file_attachment("notes.docx", b"zip"),
        );
        let attachments = parse_get_attachment_response(&response_with(&body)).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].name, "notes.docx");
    }

    #[test]
    fn test_parse_skips_empty_content() {
        let body = concat!(
            "<m:GetAttachmentResponseMessage ResponseClass=\"Success\">",
            "<m:Attachments>",
            "<t:FileAttachment><t:Name>empty.docx</t:Name><t:Content></t:Content></t:FileAttachment>",
            "</m:Attachments>",
            "</m:GetAttachmentResponseMessage>",
        );
        let attachments = parse_get_attachment_response(&response_with(body)).unwrap();
        assert!(attachments.is_empty());
    }

    #[test]
    fn test_parse_base64_with_line_breaks() {
        let encoded = BASE64_STANDARD.encode(b"spread across lines");
        let (head, tail) = encoded.split_at(8);
        let body = format!(
            concat!(
                "<m:GetAttachmentResponseMessage ResponseClass=\"Success\">",
                "<m:Attachments>",
                "<t:FileAttachment><t:Name>a.docx</t:Name>",
                "<t:Content>{head}\r\n{tail}</t:Content></t:FileAttachment>",
                "</m:Attachments>",
                "</m:GetAttachmentResponseMessage>",
            ),
            head = head,
            tail = tail,
        );
        let attachments = parse_get_attachment_response(&response_with(&body)).unwrap();
        assert_eq!(attachments[0].bytes, b"spread across lines");
    }

    #[test]
    fn test_parse_error_response_fails_batch() {
        let body = concat!(
            "<m:GetAttachmentResponseMessage ResponseClass=\"Error\">",
            "<m:MessageText>The attachment could not be opened.</m:MessageText>",
            "<m:ResponseCode>ErrorCannotOpenFileAttachment</m:ResponseCode>",
            "</m:GetAttachmentResponseMessage>",
        );
        let result = parse_get_attachment_response(&response_with(body));
        match result {
            Err(FetchError::ServiceFailure(message)) => {
                assert!(message.contains("could not be opened"));
            }
            other => panic!("expected service failure, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty_response() {
        let attachments = parse_get_attachment_response(&response_with("")).unwrap();
        assert!(attachments.is_empty());
    }
}
