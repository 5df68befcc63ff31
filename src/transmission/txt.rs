use super::ApiResponse;
use crate::dns::DNSResource;

/// TTL for every transmission API answer record
pub const ANSWER_TTL: u32 = 60;

/// Render a response as RFC 1464 attribute TXT records: one record per `k=v`
/// attribute plus the `$count=N` sentinel clients use to detect truncation.
pub fn render_txt_answers(name_labels: &[String], response: &ApiResponse) -> Vec<DNSResource> {
    response
        .to_attributes()
        .iter()
        .map(|attribute| DNSResource::txt(name_labels.to_vec(), ANSWER_TTL, attribute))
        .collect()
}
