//! Recursive-descent recognizer of the circuit definition grammar.
//!
//! Each successful `dev`/`con`/`sig` construct is dispatched immediately to
//! `logsim-devices`/`logsim-network`/`logsim-monitors`; there is no separate
//! semantic pass. Every fault — syntactic or semantic — is translated into
//! one [`LogsimError`] and followed by panic-mode recovery so the parser
//! always runs to EOF and collects every distinct fault in one pass.

use logsim_devices::{Device, DeviceKind, DeviceTable, InputPort, MakeDeviceResult, OutputPort, PortId, RawProperty};
use logsim_monitors::{MonitorResult, MonitorTable};
use logsim_names::{Keyword, NameId, SharedNames};
use logsim_network::{ConnectionResult, Network};
use logsim_scanner::{Scanner, Symbol, SymbolId, SymbolKind};

/// The pure tag identifying which fault occurred, independent of its
/// rendered message or source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoSemicolon,
    NoColon,
    NoArrow,
    NoDot,
    Dot,
    NoDeviceType,
    NoNumber,
    InvalidName,
    NoInitialisationKeyword,
    NotEnd,
    MissedSemicolon,
    NoPeriod,
    NoWaveform,

    NotBit,
    QualifierPresent,
    InvalidRange,
    ClockPeriodZero,
    NonbinaryWaveform,
    RepeatedDevice,

    DeviceAbsent,
    InputConnected,
    InputToInput,
    OutputToOutput,
    PortAbsent,
    InvalidPort,
    InvalidPortDtype,
    InvalidPortXor,
    NotIPort,
    PortOutRange,
    InvalidConnectionSc,

    RepeatedMonitor,

    NetworkConnectivity,
    EmptyFile,
}

/// A single parse-time fault: its kind, rendered message, line, and the
/// source-line-plus-caret snippet `logsim-scanner` produced for it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}\nLINE {line}:\n{snippet}")]
pub struct LogsimError {
    pub kind: ErrorKind,
    pub message: &'static str,
    pub line: u32,
    pub snippet: String,
}

/// The result of a full parse: every fault collected, and whether the
/// parse succeeded (`error_count == 0`).
#[derive(Debug)]
pub struct ParseOutcome {
    pub errors: Vec<LogsimError>,
    pub success: bool,
}

impl ParseOutcome {
    /// Renders every error plus the trailing summary line, per the
    /// external interface's stdout contract.
    #[must_use]
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for error in &self.errors {
            rendered.push_str(&error.to_string());
            rendered.push_str("\n\n");
        }
        let noun = if self.errors.len() == 1 { "error" } else { "errors" };
        rendered.push_str(&format!("Summary: {} {noun} found", self.errors.len()));
        rendered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Devices,
    Connect,
    Monitor,
}

/// Recognizes the grammar over a [`Scanner`], dispatching to a freshly
/// built [`Network`] and [`MonitorTable`] as it goes.
pub struct Parser {
    names: SharedNames,
    scanner: Scanner,
    network: Network,
    monitors: MonitorTable,
    current: Symbol,
    current_section: Option<Section>,
    errors: Vec<LogsimError>,
}

impl Parser {
    #[must_use]
    pub fn new(mut scanner: Scanner, names: SharedNames) -> Self {
        let current = scanner.next_symbol();
        Self {
            network: Network::new(DeviceTable::new(names.clone())),
            monitors: MonitorTable::new(names.clone()),
            names,
            scanner,
            current,
            current_section: None,
            errors: Vec::new(),
        }
    }

    /// Runs the whole grammar recognizer to completion (always reaching
    /// EOF) and returns every fault collected.
    pub fn parse(&mut self) -> ParseOutcome {
        self.parse_program();

        if !self.network.check_network() {
            self.record_error(ErrorKind::NetworkConnectivity, &self.current.clone());
        }

        let nothing_declared =
            self.network.devices().order().is_empty() && self.monitors.monitored().is_empty() && self.errors.is_empty();
        if nothing_declared {
            self.record_error(ErrorKind::EmptyFile, &self.current.clone());
        }

        let errors = std::mem::take(&mut self.errors);
        let success = errors.is_empty();
        ParseOutcome { errors, success }
    }

    /// Hands over the device network and monitor table built during
    /// parsing. Call only after [`Parser::parse`].
    #[must_use]
    pub fn into_parts(self) -> (Network, MonitorTable) {
        (self.network, self.monitors)
    }

    fn parse_program(&mut self) {
        loop {
            if self.current.is_eof() {
                self.record_error(ErrorKind::NotEnd, &self.current.clone());
                return;
            }
            match self.keyword_of(&self.current.clone()) {
                Some(Keyword::Devices) => {
                    self.advance();
                    self.current_section = Some(Section::Devices);
                    self.device_list();
                    self.current_section = None;
                }
                Some(Keyword::Connect) => {
                    self.advance();
                    self.current_section = Some(Section::Connect);
                    self.connection_list();
                    self.current_section = None;
                }
                Some(Keyword::Monitor) => {
                    self.advance();
                    self.current_section = Some(Section::Monitor);
                    self.monitor_list();
                    self.current_section = None;
                }
                Some(Keyword::End) => {
                    self.advance();
                    self.end_of_file();
                    return;
                }
                _ => self.error(ErrorKind::NoInitialisationKeyword),
            }
        }
    }

    fn end_of_file(&mut self) {
        if !self.current.is_eof() {
            self.record_error(ErrorKind::NotEnd, &self.current.clone());
        }
    }

    fn device_list(&mut self) {
        self.device();
        self.continue_list(Self::device);
    }

    fn connection_list(&mut self) {
        self.connection();
        self.continue_list(Self::connection);
    }

    fn monitor_list(&mut self) {
        self.monitor();
        self.continue_list(Self::monitor);
    }

    fn continue_list(&mut self, mut item: impl FnMut(&mut Self)) {
        loop {
            if self.current_section.is_none() {
                return;
            }
            match self.current.kind {
                SymbolKind::Comma => {
                    self.advance();
                    item(self);
                }
                SymbolKind::Semicolon => {
                    self.advance();
                    self.current_section = None;
                    return;
                }
                _ => {
                    self.error(ErrorKind::NoSemicolon);
                    return;
                }
            }
        }
    }

    fn device(&mut self) {
        let name_symbol = self.current.clone();
        if name_symbol.kind != SymbolKind::Name {
            if self.is_section_keyword(&name_symbol) {
                self.error(ErrorKind::MissedSemicolon);
            } else {
                self.error(ErrorKind::InvalidName);
            }
            return;
        }
        let name_id = name_symbol.name_id().expect("NAME symbol carries a NameId");
        self.advance();

        if self.current.kind != SymbolKind::Colon {
            self.error(ErrorKind::NoColon);
            return;
        }
        self.advance();

        let kind_symbol = self.current.clone();
        let device_kind = self.keyword_of(&kind_symbol).and_then(device_kind_of);
        let Some(device_kind) = device_kind else {
            self.error(ErrorKind::NoDeviceType);
            return;
        };
        self.advance();

        self.make_device_parser(name_id, device_kind);
    }

    fn make_device_parser(&mut self, device_id: NameId, kind: DeviceKind) {
        let property = match kind {
            DeviceKind::Xor | DeviceKind::Dtype => {
                if self.current.kind == SymbolKind::Number {
                    self.error(ErrorKind::QualifierPresent);
                    return;
                }
                None
            }
            DeviceKind::And | DeviceKind::Nand | DeviceKind::Or | DeviceKind::Nor => {
                if self.current.kind != SymbolKind::Number {
                    self.error(ErrorKind::NoNumber);
                    return;
                }
                Some((self.current.clone(), RawProperty::Number(self.number_value())))
            }
            DeviceKind::Clock => {
                if self.current.kind != SymbolKind::Number {
                    self.error(ErrorKind::NoPeriod);
                    return;
                }
                Some((self.current.clone(), RawProperty::Number(self.number_value())))
            }
            DeviceKind::Switch => {
                if self.current.kind != SymbolKind::Number {
                    self.error(ErrorKind::NotBit);
                    return;
                }
                Some((self.current.clone(), RawProperty::Bit(self.bit_value())))
            }
            DeviceKind::Siggen => {
                if self.current.kind != SymbolKind::Number {
                    self.error(ErrorKind::NoWaveform);
                    return;
                }
                Some((self.current.clone(), RawProperty::Waveform(self.raw_value())))
            }
        };

        let property_symbol = property.as_ref().map(|(symbol, _)| symbol.clone());
        if property.is_some() {
            self.advance();
        }

        let result = self.network.devices_mut().make_device(device_id, kind, property.map(|(_, value)| value));

        match result {
            MakeDeviceResult::Ok => {}
            MakeDeviceResult::DevicePresent => self.error(ErrorKind::RepeatedDevice),
            MakeDeviceResult::QualifierPresent => self.error(ErrorKind::QualifierPresent),
            MakeDeviceResult::NoQualifier => self.report_property_error(missing_property_error(kind), &property_symbol),
            MakeDeviceResult::InvalidQualifier => {
                self.report_property_error(invalid_property_error(kind), &property_symbol);
            }
        }
    }

    fn report_property_error(&mut self, kind: ErrorKind, property_symbol: &Option<Symbol>) {
        match property_symbol {
            Some(symbol) => self.error_at(kind, symbol),
            None => self.error(kind),
        }
    }

    fn connection(&mut self) {
        let Some((src_dev, src_port)) = self.parse_source_signal() else {
            return;
        };

        if self.current.kind != SymbolKind::Arrow {
            self.error(ErrorKind::NoArrow);
            return;
        }
        self.advance();

        let Some((sink_dev, sink_port)) = self.parse_sink_signal() else {
            return;
        };

        let result = self.network.make_connection(sink_dev, PortId::Input(sink_port), src_dev, PortId::Output(src_port));
        match result {
            ConnectionResult::Ok => {}
            ConnectionResult::DeviceAbsent => self.error(ErrorKind::DeviceAbsent),
            ConnectionResult::InputConnected => self.error(ErrorKind::InputConnected),
            ConnectionResult::InputToInput => self.error(ErrorKind::InputToInput),
            ConnectionResult::OutputToOutput => self.error(ErrorKind::OutputToOutput),
            ConnectionResult::PortAbsent => self.error(ErrorKind::PortAbsent),
        }
    }

    fn monitor(&mut self) {
        let Some((dev, port)) = self.parse_source_signal() else {
            return;
        };
        let result = self.monitors.make_monitor(self.network.devices(), dev, port, 0);
        match result {
            MonitorResult::NoError => {}
            MonitorResult::DeviceAbsent => self.error(ErrorKind::DeviceAbsent),
            MonitorResult::NotOutput => self.error(ErrorKind::InvalidPort),
            MonitorResult::MonitorPresent => self.error(ErrorKind::RepeatedMonitor),
        }
    }

    /// Parses the token sequence before an arrow (a connection's source)
    /// or a bare monitor target: `NAME` for single-output devices, or
    /// `NAME.Q` / `NAME.QBAR` for `DTYPE`.
    fn parse_source_signal(&mut self) -> Option<(NameId, OutputPort)> {
        let name_symbol = self.current.clone();
        if name_symbol.kind != SymbolKind::Name {
            if self.is_section_keyword(&name_symbol) {
                self.error(ErrorKind::MissedSemicolon);
            } else {
                self.error(ErrorKind::InvalidName);
            }
            return None;
        }
        let name_id = name_symbol.name_id().expect("NAME symbol carries a NameId");
        self.advance();

        let Some(kind) = self.network.devices().get_device(name_id).map(Device::kind) else {
            self.error(ErrorKind::DeviceAbsent);
            return None;
        };

        if kind == DeviceKind::Dtype {
            if self.current.kind != SymbolKind::Dot {
                self.error(ErrorKind::NoDot);
                return None;
            }
            self.advance();
            let port_symbol = self.current.clone();
            let keyword = self.keyword_of(&port_symbol);
            self.advance();
            return match keyword {
                Some(Keyword::Q) => Some((name_id, OutputPort::Q)),
                Some(Keyword::Qbar) => Some((name_id, OutputPort::Qbar)),
                _ => {
                    self.error_at(ErrorKind::InvalidPort, &port_symbol);
                    None
                }
            };
        }

        if self.current.kind == SymbolKind::Dot {
            if kind.is_source_only() {
                self.error(ErrorKind::Dot);
            } else {
                self.error(ErrorKind::InputToInput);
            }
            return None;
        }

        Some((name_id, OutputPort::Single))
    }

    /// Parses the token sequence after an arrow (a connection's sink):
    /// `NAME.Ik` for gates, `NAME.{DATA|CLK|SET|CLEAR}` for `DTYPE`.
    fn parse_sink_signal(&mut self) -> Option<(NameId, InputPort)> {
        let name_symbol = self.current.clone();
        if name_symbol.kind != SymbolKind::Name {
            if self.is_section_keyword(&name_symbol) {
                self.error(ErrorKind::MissedSemicolon);
            } else {
                self.error(ErrorKind::InvalidName);
            }
            return None;
        }
        let name_id = name_symbol.name_id().expect("NAME symbol carries a NameId");
        self.advance();

        let Some(kind) = self.network.devices().get_device(name_id).map(Device::kind) else {
            self.error(ErrorKind::DeviceAbsent);
            return None;
        };

        if kind.is_source_only() {
            self.error(ErrorKind::InvalidConnectionSc);
            return None;
        }

        if self.current.kind != SymbolKind::Dot {
            self.error(ErrorKind::OutputToOutput);
            return None;
        }
        self.advance();

        if self.is_section_keyword(&self.current.clone()) {
            self.error(ErrorKind::MissedSemicolon);
            return None;
        }

        let port_symbol = self.current.clone();
        let keyword = self.keyword_of(&port_symbol);
        self.advance();

        match kind {
            DeviceKind::Dtype => match keyword {
                Some(Keyword::Data) => Some((name_id, InputPort::Data)),
                Some(Keyword::Clk) => Some((name_id, InputPort::Clk)),
                Some(Keyword::Set) => Some((name_id, InputPort::Set)),
                Some(Keyword::Clear) => Some((name_id, InputPort::Clear)),
                Some(Keyword::Q | Keyword::Qbar) => {
                    self.error_at(ErrorKind::OutputToOutput, &port_symbol);
                    None
                }
                _ => {
                    self.error_at(ErrorKind::InvalidPortDtype, &port_symbol);
                    None
                }
            },
            DeviceKind::Xor => match keyword.and_then(Keyword::gate_input_index) {
                Some(n) if n <= 2 => Some((name_id, InputPort::Gate(n))),
                _ => {
                    self.error_at(ErrorKind::InvalidPortXor, &port_symbol);
                    None
                }
            },
            _ => match keyword.and_then(Keyword::gate_input_index) {
                Some(n) => Some((name_id, InputPort::Gate(n))),
                None => {
                    let text = self.resolve_symbol_text(&port_symbol);
                    if text.starts_with('I') {
                        self.error_at(ErrorKind::PortOutRange, &port_symbol);
                    } else {
                        self.error_at(ErrorKind::NotIPort, &port_symbol);
                    }
                    None
                }
            },
        }
    }

    fn number_value(&self) -> i64 {
        match &self.current.id {
            Some(SymbolId::Integer(n)) => *n,
            _ => 0,
        }
    }

    fn bit_value(&self) -> u8 {
        match &self.current.id {
            Some(SymbolId::Bit(b)) => *b,
            _ => 2,
        }
    }

    fn raw_value(&self) -> String {
        match &self.current.id {
            Some(SymbolId::Raw(s)) => s.clone(),
            _ => String::new(),
        }
    }

    fn keyword_of(&self, symbol: &Symbol) -> Option<Keyword> {
        symbol.name_id().and_then(|id| self.names.borrow().as_keyword(id))
    }

    fn is_section_keyword(&self, symbol: &Symbol) -> bool {
        matches!(self.keyword_of(symbol), Some(Keyword::Devices | Keyword::Connect | Keyword::Monitor | Keyword::End))
    }

    fn resolve_symbol_text(&self, symbol: &Symbol) -> String {
        symbol
            .name_id()
            .and_then(|id| self.names.borrow().resolve(id).map(str::to_string))
            .unwrap_or_default()
    }

    fn advance(&mut self) {
        self.current = self.scanner.next_symbol();
    }

    fn message_for(&self, kind: ErrorKind) -> &'static str {
        match kind {
            ErrorKind::MissedSemicolon => "Expected a semicolon prior to this",
            ErrorKind::NoSemicolon => "Expected a comma or semicolon",
            ErrorKind::NoColon => "Expected a colon",
            ErrorKind::NoArrow => "Expected an arrow",
            ErrorKind::NoDot => "Expected a dot",
            ErrorKind::Dot => "Did not expect a dot",
            ErrorKind::NoDeviceType => "Expected a device type",
            ErrorKind::NoNumber => "Expected number of inputs",
            ErrorKind::NoPeriod => "Expected a clock period",
            ErrorKind::NoWaveform => "Expected a waveform",
            ErrorKind::InvalidName => "Invalid device name",
            ErrorKind::NoInitialisationKeyword => "Expected DEVICES, CONNECT, MONITOR or END",
            ErrorKind::NotBit => "Expected a bit (0 or 1)",
            ErrorKind::QualifierPresent => {
                if self.current.kind == SymbolKind::Comma {
                    "Expected a comma"
                } else {
                    "Did not expect a parameter for this device"
                }
            }
            ErrorKind::InvalidRange => "Expected number between 1 and 16 inclusive",
            ErrorKind::InvalidConnectionSc => "Connection should not be made to SWITCH, CLOCK or SIGGEN",
            ErrorKind::DeviceAbsent => "Device not found",
            ErrorKind::RepeatedDevice => "Device has already been initialised",
            ErrorKind::InputConnected => "Input has already been connected",
            ErrorKind::InputToInput => "Input cannot be connected to another input",
            ErrorKind::PortAbsent => "Port not found",
            ErrorKind::OutputToOutput => "Output cannot be connected to another output",
            ErrorKind::NotIPort => "Port Absent, Port is not a valid gate input port",
            ErrorKind::PortOutRange => "Port number out of range",
            ErrorKind::InvalidPort => "Invalid port number",
            ErrorKind::InvalidPortDtype => "Port Absent, Invalid port for D-type device",
            ErrorKind::InvalidPortXor => "Port Absent, Invalid port number for XOR device",
            ErrorKind::NotEnd => "Expected file to end after END keyword",
            ErrorKind::RepeatedMonitor => "Signal cannot be monitored more than once",
            ErrorKind::ClockPeriodZero => "Clock period cannot be zero",
            ErrorKind::NonbinaryWaveform => "Siggen waveform must only consist of bits",
            ErrorKind::NetworkConnectivity => "Error: Network connectivity issues found",
            ErrorKind::EmptyFile => "Empty File",
        }
    }

    fn record_error(&mut self, kind: ErrorKind, symbol: &Symbol) {
        let message = self.message_for(kind);
        let snippet = self.scanner.format_error(symbol);
        log::debug!("parse error {kind:?} at line {}", symbol.line);
        self.errors.push(LogsimError { kind, message, line: symbol.line, snippet });
    }

    /// Records a fault anchored at the current lookahead symbol, then
    /// enters panic-mode recovery.
    fn error(&mut self, kind: ErrorKind) {
        let symbol = self.current.clone();
        self.record_error(kind, &symbol);
        self.recover(kind);
    }

    /// Records a fault anchored at an already-consumed symbol, then
    /// enters panic-mode recovery from the current lookahead.
    fn error_at(&mut self, kind: ErrorKind, symbol: &Symbol) {
        self.record_error(kind, symbol);
        self.recover(kind);
    }

    /// Consumes tokens until the next synchronization point: a COMMA while
    /// still inside a list, a SEMICOLON (ends the list/section), a section
    /// keyword/END (resyncs to program level, with a synthetic
    /// `MISSED_SEMICOLON` diagnostic if the triggering fault wasn't
    /// already `NO_SEMICOLON`), or EOF.
    fn recover(&mut self, triggering: ErrorKind) {
        if self.current.kind == SymbolKind::Comma && self.current_section.is_some() {
            return;
        }
        if self.current.kind == SymbolKind::Semicolon {
            self.advance();
            self.current_section = None;
            return;
        }
        if self.is_section_keyword(&self.current.clone()) {
            self.current_section = None;
            return;
        }

        loop {
            if self.current.kind == SymbolKind::Comma && self.current_section.is_some() {
                return;
            }
            if self.current.kind == SymbolKind::Semicolon {
                self.advance();
                self.current_section = None;
                return;
            }
            if self.is_section_keyword(&self.current.clone()) {
                self.current_section = None;
                if triggering != ErrorKind::NoSemicolon {
                    self.record_error(ErrorKind::MissedSemicolon, &self.current.clone());
                }
                return;
            }
            if self.current.is_eof() {
                self.current_section = None;
                self.record_error(ErrorKind::NotEnd, &self.current.clone());
                return;
            }
            self.advance();
        }
    }
}

fn device_kind_of(keyword: Keyword) -> Option<DeviceKind> {
    match keyword {
        Keyword::And => Some(DeviceKind::And),
        Keyword::Nand => Some(DeviceKind::Nand),
        Keyword::Or => Some(DeviceKind::Or),
        Keyword::Nor => Some(DeviceKind::Nor),
        Keyword::Xor => Some(DeviceKind::Xor),
        Keyword::Dtype => Some(DeviceKind::Dtype),
        Keyword::Clock => Some(DeviceKind::Clock),
        Keyword::Switch => Some(DeviceKind::Switch),
        Keyword::Siggen => Some(DeviceKind::Siggen),
        _ => None,
    }
}

fn missing_property_error(kind: DeviceKind) -> ErrorKind {
    match kind {
        DeviceKind::And | DeviceKind::Nand | DeviceKind::Or | DeviceKind::Nor => ErrorKind::NoNumber,
        DeviceKind::Clock => ErrorKind::NoPeriod,
        DeviceKind::Switch => ErrorKind::NotBit,
        DeviceKind::Siggen => ErrorKind::NoWaveform,
        DeviceKind::Xor | DeviceKind::Dtype => ErrorKind::QualifierPresent,
    }
}

fn invalid_property_error(kind: DeviceKind) -> ErrorKind {
    match kind {
        DeviceKind::And | DeviceKind::Nand | DeviceKind::Or | DeviceKind::Nor => ErrorKind::InvalidRange,
        DeviceKind::Clock => ErrorKind::ClockPeriodZero,
        DeviceKind::Switch => ErrorKind::NotBit,
        DeviceKind::Siggen => ErrorKind::NonbinaryWaveform,
        DeviceKind::Xor | DeviceKind::Dtype => ErrorKind::QualifierPresent,
    }
}
