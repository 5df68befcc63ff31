/// A query name under the tunnel zone, decoded into the transmission API's
/// request grammar. Labels are read right to left: the trailing label names
/// the endpoint, everything before it is that endpoint's arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiRequest {
    Begin { prefix: String },
    Continue { data: String, index: usize, id: String },
    End { length: usize, id: String },
    Other { name: String },
    Failure { name: String },
}

/// Decode the labels left after the zone suffix was stripped. `name` is the
/// full query name, kept for the Other/Failure variants.
pub fn parse_api_request(labels: &[String], name: &str) -> ApiRequest {
    let Some(endpoint) = labels.last() else {
        return ApiRequest::Failure {
            name: name.to_string(),
        };
    };
    let args = &labels[..labels.len() - 1];

    if endpoint.eq_ignore_ascii_case("begin") {
        match args.last() {
            Some(prefix) if !prefix.is_empty() => ApiRequest::Begin {
                prefix: prefix.clone(),
            },
            _ => ApiRequest::Failure {
                name: name.to_string(),
            },
        }
    } else if endpoint.eq_ignore_ascii_case("continue") {
        // <data-label>+ . <index> . <id> . continue
        if args.len() < 3 {
            return ApiRequest::Failure {
                name: name.to_string(),
            };
        }
        let id = args[args.len() - 1].clone();
        let Ok(index) = args[args.len() - 2].parse::<usize>() else {
            return ApiRequest::Failure {
                name: name.to_string(),
            };
        };
        let data = args[..args.len() - 2].concat();
        ApiRequest::Continue { data, index, id }
    } else if endpoint.eq_ignore_ascii_case("end") {
        // <length> . <id> . end
        if args.len() < 2 {
            return ApiRequest::Failure {
                name: name.to_string(),
            };
        }
        let id = args[args.len() - 1].clone();
        let Ok(length) = args[args.len() - 2].parse::<usize>() else {
            return ApiRequest::Failure {
                name: name.to_string(),
            };
        };
        ApiRequest::End { length, id }
    } else {
        ApiRequest::Other {
            name: name.to_string(),
        }
    }
}
