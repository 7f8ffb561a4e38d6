//! UDMF TEXTMAP parsing.
//!
//! UDMF does not mandate declaration order (sidedefs may appear after
//! the linedefs referring to them), so the lump is scanned three times:
//! vertices + sectors + things, then sidedefs, then linedefs.  Unknown
//! keys and unknown block types are consumed and ignored.

use crate::build::BuildError;
use crate::map::{Level, Linedef, Thing};
use crate::wad::Wad;

/*====================================================================*/
/*                             Lexer                                  */
/*====================================================================*/

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Num(f64),
    Punct(u8),
    Eof,
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(bytes: &'a [u8]) -> Lexer<'a> {
        Lexer { bytes, pos: 0 }
    }

    fn err(&self, what: &str) -> BuildError {
        BuildError::BadData(format!("malformed TEXTMAP lump: {what}"))
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_space(&mut self) -> Result<(), BuildError> {
        loop {
            match self.peek_byte() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while let Some(b) = self.peek_byte() {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    self.pos += 2;
                    loop {
                        match self.peek_byte() {
                            None => return Err(self.err("unterminated comment")),
                            Some(b'*') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next(&mut self) -> Result<Tok, BuildError> {
        self.skip_space()?;

        let Some(b) = self.peek_byte() else {
            return Ok(Tok::Eof);
        };

        match b {
            b'{' | b'}' | b'=' | b';' => {
                self.pos += 1;
                Ok(Tok::Punct(b))
            }
            b'"' => {
                self.pos += 1;
                let start = self.pos;
                while let Some(c) = self.peek_byte() {
                    if c == b'"' {
                        let s = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                        self.pos += 1;
                        return Ok(Tok::Str(s));
                    }
                    self.pos += 1;
                }
                Err(self.err("unterminated string"))
            }
            b'+' | b'-' | b'0'..=b'9' | b'.' => self.lex_number(),
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                let start = self.pos;
                while let Some(c) = self.peek_byte() {
                    if c.is_ascii_alphanumeric() || c == b'_' {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                let s = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                Ok(Tok::Ident(s))
            }
            _ => Err(self.err("unexpected character")),
        }
    }

    fn lex_number(&mut self) -> Result<Tok, BuildError> {
        let start = self.pos;

        if matches!(self.peek_byte(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }

        // hex literal
        if self.peek_byte() == Some(b'0')
            && matches!(self.bytes.get(self.pos + 1), Some(b'x') | Some(b'X'))
        {
            self.pos += 2;
            let digits = self.pos;
            while self.peek_byte().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            if self.pos == digits {
                return Err(self.err("bad hex literal"));
            }
            let text = std::str::from_utf8(&self.bytes[digits..self.pos]).unwrap();
            let mut val = u32::from_str_radix(text, 16).map_err(|_| self.err("bad hex literal"))?
                as f64;
            if self.bytes[start] == b'-' {
                val = -val;
            }
            return Ok(Tok::Num(val));
        }

        while self
            .peek_byte()
            .is_some_and(|c| c.is_ascii_digit() || c == b'.' || c == b'e' || c == b'E')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        text.parse::<f64>()
            .map(Tok::Num)
            .map_err(|_| self.err("bad numeric literal"))
    }

    /// Consume the next token when it is the given punctuation.
    fn eat_punct(&mut self, p: u8) -> Result<bool, BuildError> {
        let save = self.pos;
        if self.next()? == Tok::Punct(p) {
            Ok(true)
        } else {
            self.pos = save;
            Ok(false)
        }
    }
}

/*====================================================================*/
/*                             Parser                                 */
/*====================================================================*/

#[derive(Clone, Copy, PartialEq)]
enum BlockKind {
    Thing,
    Vertex,
    Sector,
    Sidedef,
    Linedef,
    Skip,
}

fn as_int(v: &Tok) -> Option<i64> {
    match v {
        Tok::Num(n) => Some(*n as i64),
        _ => None,
    }
}

fn as_f64(v: &Tok) -> Option<f64> {
    match v {
        Tok::Num(n) => Some(*n),
        _ => None,
    }
}

fn as_bool(v: &Tok) -> bool {
    matches!(v, Tok::Ident(s) if s == "true")
}

/// Decode the TEXTMAP lump of map `lev_idx` into `lev`.
pub fn parse_textmap(wad: &Wad, lev_idx: usize, lev: &mut Level) -> Result<(), BuildError> {
    let idx = wad
        .level_lookup_lump(lev_idx, "TEXTMAP")
        .ok_or_else(|| BuildError::BadData(format!("{}: missing TEXTMAP lump", lev.name)))?;
    let data = wad.lump(idx).data.clone();

    for pass in 1..=3 {
        parse_pass(&data, pass, lev)?;
    }
    Ok(())
}

fn parse_pass(data: &[u8], pass: u32, lev: &mut Level) -> Result<(), BuildError> {
    let mut lex = Lexer::new(data);

    loop {
        let section = match lex.next()? {
            Tok::Eof => return Ok(()),
            Tok::Ident(s) => s,
            _ => return Err(lex.err("expected block name")),
        };

        // top-level assignment, e.g. namespace = "zdoom";
        if lex.eat_punct(b'=')? {
            lex.next()?;
            if !lex.eat_punct(b';')? {
                return Err(lex.err("missing ';'"));
            }
            continue;
        }

        if !lex.eat_punct(b'{')? {
            return Err(lex.err("missing '{'"));
        }

        let kind = match (section.as_str(), pass) {
            ("thing", 1) => BlockKind::Thing,
            ("vertex", 1) => BlockKind::Vertex,
            ("sector", 1) => BlockKind::Sector,
            ("sidedef", 2) => BlockKind::Sidedef,
            ("linedef", 3) => BlockKind::Linedef,
            _ => BlockKind::Skip,
        };

        parse_block(&mut lex, kind, lev)?;
    }
}

fn parse_block(lex: &mut Lexer, kind: BlockKind, lev: &mut Level) -> Result<(), BuildError> {
    // allocate the entity up front; fields arrive in any order
    let ent = match kind {
        BlockKind::Vertex => Some(lev.new_vertex(0.0, 0.0)),
        BlockKind::Sector => Some(lev.new_sector()),
        BlockKind::Sidedef => Some(lev.new_sidedef(None)),
        _ => None,
    };
    let mut thing = match kind {
        BlockKind::Thing => Some(Thing {
            x: 0.0,
            y: 0.0,
            kind: 0,
            index: lev.things.len(),
        }),
        _ => None,
    };
    let mut line = match kind {
        BlockKind::Linedef => Some(Linedef {
            start: usize::MAX,
            end: usize::MAX,
            right: None,
            left: None,
            line_type: 0,
            tag: 0,
            two_sided: false,
            is_precious: false,
            self_ref: false,
            zero_len: false,
            overlap: false,
            index: 0,
        }),
        _ => None,
    };

    loop {
        if lex.eat_punct(b'}')? {
            break;
        }

        let key = match lex.next()? {
            Tok::Ident(s) => s,
            Tok::Eof => return Err(lex.err("unclosed block")),
            _ => return Err(lex.err("missing key")),
        };
        if !lex.eat_punct(b'=')? {
            return Err(lex.err("missing '='"));
        }
        let value = match lex.next()? {
            Tok::Eof | Tok::Punct(_) => return Err(lex.err("missing value")),
            v => v,
        };
        if !lex.eat_punct(b';')? {
            return Err(lex.err("missing ';'"));
        }

        match kind {
            BlockKind::Vertex => {
                let v = &mut lev.verts[ent.unwrap()];
                match key.as_str() {
                    "x" => v.x = as_f64(&value).unwrap_or(0.0),
                    "y" => v.y = as_f64(&value).unwrap_or(0.0),
                    _ => {}
                }
            }
            BlockKind::Thing => {
                let t = thing.as_mut().unwrap();
                match key.as_str() {
                    "x" => t.x = as_f64(&value).unwrap_or(0.0),
                    "y" => t.y = as_f64(&value).unwrap_or(0.0),
                    "type" => t.kind = as_int(&value).unwrap_or(0) as u16,
                    _ => {}
                }
            }
            BlockKind::Sidedef => {
                if key == "sector" {
                    let num = as_int(&value).unwrap_or(-1);
                    if num < 0 || num as usize >= lev.sectors.len() {
                        return Err(BuildError::BadData(format!(
                            "{}: illegal sector number #{}",
                            lev.name, num
                        )));
                    }
                    lev.sides[ent.unwrap()].sector = Some(num as usize);
                }
            }
            BlockKind::Linedef => {
                let l = line.as_mut().unwrap();
                match key.as_str() {
                    "v1" | "v2" => {
                        let num = as_int(&value).unwrap_or(-1);
                        if num < 0 || num as usize >= lev.verts.len() {
                            return Err(BuildError::BadData(format!(
                                "{}: illegal vertex number #{}",
                                lev.name, num
                            )));
                        }
                        if key == "v1" {
                            l.start = num as usize;
                        } else {
                            l.end = num as usize;
                        }
                    }
                    "special" => l.line_type = as_int(&value).unwrap_or(0) as u16,
                    "twosided" => l.two_sided = as_bool(&value),
                    // out-of-range side references mean "no side"
                    "sidefront" | "sideback" => {
                        let num = as_int(&value).unwrap_or(-1);
                        let side = if num < 0 || num as usize >= lev.sides.len() {
                            None
                        } else {
                            Some(num as usize)
                        };
                        if key == "sidefront" {
                            l.right = side;
                        } else {
                            l.left = side;
                        }
                    }
                    _ => {}
                }
            }
            BlockKind::Sector | BlockKind::Skip => {}
        }
    }

    if let Some(t) = thing {
        lev.things.push(t);
    }
    if let Some(l) = line {
        if l.start == usize::MAX || l.end == usize::MAX {
            return Err(BuildError::BadData(format!(
                "{}: linedef #{} is missing a vertex",
                lev.name,
                lev.lines.len()
            )));
        }
        super::load::finish_linedef(lev, l);
    }
    Ok(())
}

/*====================================================================*/
/*                               Tests                                */
/*====================================================================*/
