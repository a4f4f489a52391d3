macro_rules! lookup_table {
    ($name:ident => $( $slice:expr ),+) => {
        const $name: [bool; 256] = {
            let mut arr = [false; 256];
            $(
                let mut i = 0;
                while i < $slice.len() {
                    arr[$slice[i] as usize] = true;
                    i += 1;
                }
            )*
            arr
        };
    };
}

macro_rules! parse_header_param {
    ($parser:ident) => (
        $crate::macros::parse_param!(
            $parser,
            $crate::parser::Parser::parse_param_ref,
        )
    );

    ($parser:ident, $($name:ident = $var:expr),*) => (
        $crate::macros::parse_param!(
            $parser,
            $crate::parser::Parser::parse_param_ref,
            $($name = $var),*
        )
    );
}

macro_rules! parse_param {
    (
        $parser:ident,
        $func:expr,
        $($name:ident = $var:expr),*
    ) =>  {{
        $parser.space();
        match $parser.peek_byte() {
            Some(b';') => {
                let mut params = $crate::message::Params::new();
                while let Some(b';') = $parser.peek_byte() {
                        // take ';' character
                        let _ = $parser.next_byte();
                        let param = $func($parser)?;
                        $(
                            if param.0.eq_ignore_ascii_case($name) {
                                // A valueless param still counts as
                                // present, e.g. ";rport" or ";lr".
                                $var = Some(param.1.unwrap_or_default().into());
                                $parser.space();
                                continue;
                            }
                        )*
                        params.push(param.into());
                        $parser.space();
                    }
                    if params.is_empty() {
                        None
                    } else {
                        Some(params)
                    }
                },
                _ => {
                    None
                }
            }
        }};
    }

macro_rules! comma_separated {
    ($parser:ident => $body:expr) => {{
        $parser.space();
        $body

        while let Some(b',') = $parser.peek_byte() {
            let _ = $parser.next_byte();
            $parser.space();
            $body
        }
    }};
}

macro_rules! hdr_list {
    ($parser:ident => $body:expr) => {{
        let mut hdr_itens = Vec::with_capacity(1);
        $crate::macros::comma_separated!($parser => {
            hdr_itens.push($body);
        });
        hdr_itens
    }};
}

#[macro_export]
macro_rules! headers {
    () => (
        $crate::headers::Headers::new()
    );
    ($($x:expr),+ $(,)?) => (
        $crate::headers::Headers::from(vec![$($x),+])
    );
}

macro_rules! try_parse_hdr {
    ($header:ident, $parser:ident) => {{
        match <$header as $crate::headers::HeaderParse>::parse($parser) {
            Ok(header) => header,
            Err(err) => {
                return Err($crate::error::SipParserError {
                    message: format!(
                        "Failed to parse '{}' header: {err}",
                        <$header as $crate::headers::HeaderParse>::NAME
                    ),
                }
                .into());
            }
        }
    }};
}

#[macro_export]
macro_rules! filter_map_header {
    ($hdrs:expr, $header:ident) => {
        $hdrs.iter().filter_map(|hdr| {
            if let $crate::headers::Header::$header(v) = hdr {
                Some(v)
            } else {
                None
            }
        })
    };
}

#[macro_export]
macro_rules! find_map_header {
    ($hdrs:expr, $header:ident) => {
        $hdrs.iter().find_map(|hdr| {
            if let $crate::headers::Header::$header(v) = hdr {
                Some(v)
            } else {
                None
            }
        })
    };
}

#[macro_export]
macro_rules! find_map_mut_header {
    ($hdrs:expr, $header:ident) => {
        $hdrs.iter_mut().find_map(|hdr| {
            if let $crate::headers::Header::$header(v) = hdr {
                Some(v)
            } else {
                None
            }
        })
    };
}

pub(crate) use comma_separated;
pub(crate) use hdr_list;
pub use filter_map_header;
pub use find_map_header;
pub use find_map_mut_header;
pub use headers;
pub(crate) use lookup_table;
pub(crate) use parse_header_param;
pub(crate) use parse_param;
pub(crate) use try_parse_hdr;
