//! Bidirectional interning of identifier strings to integer IDs.
//!
//! Every later layer (scanner, devices, network, monitors, parser) shares a
//! single [`NameTable`] instance so that a device name, a port name, and a
//! keyword are all referred to by the same kind of ID instead of by string
//! comparison at every call site.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A `NameTable` shared by every layer of the simulator (scanner, devices,
/// network, monitors, parser) so a device name, a keyword, and a port name
/// all resolve through the same table instead of each layer keeping its
/// own copy.
pub type SharedNames = Rc<RefCell<NameTable>>;

/// A dense, first-seen-order identifier for an interned string.
///
/// Once assigned, an ID never changes: `NameTable` is append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NameId(u32);

impl NameId {
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Reserved words of the circuit definition language. This fixes their
/// `NameId`s at table construction time, ahead of any user-defined name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Devices,
    Connect,
    Monitor,
    End,
    Clock,
    Switch,
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Dtype,
    Siggen,
    Data,
    Clk,
    Set,
    Clear,
    Q,
    Qbar,
    I1,
    I2,
    I3,
    I4,
    I5,
    I6,
    I7,
    I8,
    I9,
    I10,
    I11,
    I12,
    I13,
    I14,
    I15,
    I16,
}

impl Keyword {
    /// All keywords, in their reserved-ID order.
    pub const ALL: [Keyword; 35] = [
        Keyword::Devices,
        Keyword::Connect,
        Keyword::Monitor,
        Keyword::End,
        Keyword::Clock,
        Keyword::Switch,
        Keyword::And,
        Keyword::Nand,
        Keyword::Or,
        Keyword::Nor,
        Keyword::Xor,
        Keyword::Dtype,
        Keyword::Siggen,
        Keyword::Data,
        Keyword::Clk,
        Keyword::Set,
        Keyword::Clear,
        Keyword::Q,
        Keyword::Qbar,
        Keyword::I1,
        Keyword::I2,
        Keyword::I3,
        Keyword::I4,
        Keyword::I5,
        Keyword::I6,
        Keyword::I7,
        Keyword::I8,
        Keyword::I9,
        Keyword::I10,
        Keyword::I11,
        Keyword::I12,
        Keyword::I13,
        Keyword::I14,
        Keyword::I15,
        Keyword::I16,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Keyword::Devices => "DEVICES",
            Keyword::Connect => "CONNECT",
            Keyword::Monitor => "MONITOR",
            Keyword::End => "END",
            Keyword::Clock => "CLOCK",
            Keyword::Switch => "SWITCH",
            Keyword::And => "AND",
            Keyword::Nand => "NAND",
            Keyword::Or => "OR",
            Keyword::Nor => "NOR",
            Keyword::Xor => "XOR",
            Keyword::Dtype => "DTYPE",
            Keyword::Siggen => "SIGGEN",
            Keyword::Data => "DATA",
            Keyword::Clk => "CLK",
            Keyword::Set => "SET",
            Keyword::Clear => "CLEAR",
            Keyword::Q => "Q",
            Keyword::Qbar => "QBAR",
            Keyword::I1 => "I1",
            Keyword::I2 => "I2",
            Keyword::I3 => "I3",
            Keyword::I4 => "I4",
            Keyword::I5 => "I5",
            Keyword::I6 => "I6",
            Keyword::I7 => "I7",
            Keyword::I8 => "I8",
            Keyword::I9 => "I9",
            Keyword::I10 => "I10",
            Keyword::I11 => "I11",
            Keyword::I12 => "I12",
            Keyword::I13 => "I13",
            Keyword::I14 => "I14",
            Keyword::I15 => "I15",
            Keyword::I16 => "I16",
        }
    }

    /// Returns the `Ik` gate input port this keyword names, if any.
    #[must_use]
    pub const fn gate_input_index(self) -> Option<u8> {
        match self {
            Keyword::I1 => Some(1),
            Keyword::I2 => Some(2),
            Keyword::I3 => Some(3),
            Keyword::I4 => Some(4),
            Keyword::I5 => Some(5),
            Keyword::I6 => Some(6),
            Keyword::I7 => Some(7),
            Keyword::I8 => Some(8),
            Keyword::I9 => Some(9),
            Keyword::I10 => Some(10),
            Keyword::I11 => Some(11),
            Keyword::I12 => Some(12),
            Keyword::I13 => Some(13),
            Keyword::I14 => Some(14),
            Keyword::I15 => Some(15),
            Keyword::I16 => Some(16),
            _ => None,
        }
    }

    /// Whether this keyword introduces a device kind in a `DEVICES` entry.
    #[must_use]
    pub const fn is_device_kind(self) -> bool {
        matches!(
            self,
            Keyword::Clock
                | Keyword::Switch
                | Keyword::And
                | Keyword::Nand
                | Keyword::Or
                | Keyword::Nor
                | Keyword::Xor
                | Keyword::Dtype
                | Keyword::Siggen
        )
    }
}

/// Maps identifier strings to dense integer IDs and back.
///
/// Lookup is a total bijection: every ID ever returned resolves back to the
/// string that produced it, and re-interning the same string returns the
/// same ID. The table also hands out contiguous ranges of error codes on
/// request, which lets independent components reserve non-overlapping code
/// ranges without coordinating with one another directly.
pub struct NameTable {
    strings: Vec<String>,
    ids: HashMap<String, NameId>,
    keyword_ids: HashMap<Keyword, NameId>,
    next_error_code: u32,
}

impl NameTable {
    /// Creates a table with the language's reserved keywords preallocated,
    /// in the order `Keyword::ALL` lists them.
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            strings: Vec::new(),
            ids: HashMap::new(),
            keyword_ids: HashMap::new(),
            next_error_code: 0,
        };
        for keyword in Keyword::ALL {
            let id = table.intern(keyword.as_str());
            table.keyword_ids.insert(keyword, id);
        }
        table
    }

    /// Interns `s`, returning its existing ID if already present or a fresh
    /// one otherwise.
    pub fn intern(&mut self, s: &str) -> NameId {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = NameId(u32::try_from(self.strings.len()).expect("name table overflowed u32"));
        self.strings.push(s.to_string());
        self.ids.insert(s.to_string(), id);
        id
    }

    /// Interns every string in `list`, in order.
    pub fn intern_all(&mut self, list: &[&str]) -> Vec<NameId> {
        list.iter().map(|s| self.intern(s)).collect()
    }

    /// Returns the string `id` was interned from, if `id` is valid.
    #[must_use]
    pub fn resolve(&self, id: NameId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(String::as_str)
    }

    /// Returns the ID for `s` without inserting it.
    #[must_use]
    pub fn query(&self, s: &str) -> Option<NameId> {
        self.ids.get(s).copied()
    }

    /// Returns the `NameId` reserved for `keyword`.
    #[must_use]
    pub fn keyword_id(&self, keyword: Keyword) -> NameId {
        self.keyword_ids[&keyword]
    }

    /// Returns the keyword `id` names, if `id` is a reserved keyword ID.
    #[must_use]
    pub fn as_keyword(&self, id: NameId) -> Option<Keyword> {
        Keyword::ALL
            .into_iter()
            .find(|&keyword| self.keyword_ids[&keyword] == id)
    }

    /// Reserves and returns `n` unique, contiguous error codes.
    pub fn reserve_error_codes(&mut self, n: u32) -> std::ops::Range<u32> {
        let start = self.next_error_code;
        self.next_error_code += n;
        start..self.next_error_code
    }
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_interned_string() {
        let mut names = NameTable::new();
        let id = names.intern("D1");
        assert_eq!(names.resolve(id), Some("D1"));
    }

    #[test]
    fn repeated_intern_returns_the_same_id() {
        let mut names = NameTable::new();
        let first = names.intern("N1");
        let second = names.intern("N1");
        assert_eq!(first, second);
    }

    #[test]
    fn query_does_not_insert() {
        let mut names = NameTable::new();
        assert_eq!(names.query("ghost"), None);
        assert_eq!(names.intern("ghost"), names.query("ghost").unwrap());
    }

    #[test]
    fn keywords_are_preallocated_and_not_reinterned() {
        let mut names = NameTable::new();
        let via_keyword = names.keyword_id(Keyword::Devices);
        let via_intern = names.intern("DEVICES");
        assert_eq!(via_keyword, via_intern);
        assert_eq!(names.as_keyword(via_keyword), Some(Keyword::Devices));
    }

    #[test]
    fn user_defined_names_follow_reserved_keywords() {
        let mut names = NameTable::new();
        let keyword_count = Keyword::ALL.len();
        let id = names.intern("D1");
        assert_eq!(id.as_u32() as usize, keyword_count);
    }

    #[test]
    fn error_codes_are_contiguous_and_non_overlapping() {
        let mut names = NameTable::new();
        let first = names.reserve_error_codes(3);
        let second = names.reserve_error_codes(2);
        assert_eq!(first, 0..3);
        assert_eq!(second, 3..5);
    }

    #[test]
    fn gate_input_index_recognises_full_range() {
        assert_eq!(Keyword::I1.gate_input_index(), Some(1));
        assert_eq!(Keyword::I16.gate_input_index(), Some(16));
        assert_eq!(Keyword::Dtype.gate_input_index(), None);
    }
}
