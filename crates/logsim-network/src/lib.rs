//! Connection table and one-cycle propagation for a [`DeviceTable`].
//!
//! Connections are stored only as `(source_device, source_port)` pairs on
//! the sink's declared input — the arena+index pattern `logsim-devices`
//! already uses for devices themselves, extended here so the network never
//! owns a device via a connection.

use std::collections::HashMap;

use logsim_devices::{Device, DeviceTable, InputPort, OutputPort, PortId, Signal};
use logsim_names::NameId;

/// A bounded number of propagation passes per cycle before declaring
/// oscillation. 20 is generous for any circuit without a genuine feedback
/// loop; nothing in this design depends on the exact value.
pub const MAX_STABILIZATION_PASSES: u32 = 20;

/// Outcome of [`Network::make_connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionResult {
    Ok,
    DeviceAbsent,
    InputConnected,
    InputToInput,
    PortAbsent,
    OutputToOutput,
}

/// Owns a [`DeviceTable`] and the connections between its devices, and
/// drives one-cycle propagation to a fixed point.
pub struct Network {
    devices: DeviceTable,
}

impl Network {
    #[must_use]
    pub fn new(devices: DeviceTable) -> Self {
        Self { devices }
    }

    #[must_use]
    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceTable {
        &mut self.devices
    }

    /// Wires `src_dev.src_port` to feed `sink_dev.sink_port`.
    pub fn make_connection(
        &mut self,
        sink_dev: NameId,
        sink_port: PortId,
        src_dev: NameId,
        src_port: PortId,
    ) -> ConnectionResult {
        if self.devices.get_device(sink_dev).is_none() || self.devices.get_device(src_dev).is_none() {
            return ConnectionResult::DeviceAbsent;
        }

        let PortId::Input(sink_input) = sink_port else {
            return ConnectionResult::OutputToOutput;
        };
        let PortId::Output(src_output) = src_port else {
            return ConnectionResult::InputToInput;
        };

        let sink_declared = self.devices.get_device(sink_dev).is_some_and(|d| d.has_input(sink_input));
        let src_declared = self
            .devices
            .get_device(src_dev)
            .is_some_and(|d| d.declared_outputs().contains(&src_output));
        if !sink_declared || !src_declared {
            return ConnectionResult::PortAbsent;
        }

        if self
            .devices
            .get_device(sink_dev)
            .and_then(|d| d.input_source(sink_input))
            .is_some()
        {
            return ConnectionResult::InputConnected;
        }

        self.devices
            .get_device_mut(sink_dev)
            .expect("checked present above")
            .set_input_source(sink_input, (src_dev, src_output));
        ConnectionResult::Ok
    }

    /// True iff every device's every declared input has a source.
    #[must_use]
    pub fn check_network(&self) -> bool {
        for &id in self.devices.order() {
            let Some(device) = self.devices.get_device(id) else { continue };
            for port in device.declared_inputs() {
                if device.input_source(port).is_none() {
                    return false;
                }
            }
        }
        true
    }

    /// Advances one simulation cycle: `CLOCK`/`SIGGEN` devices tick once,
    /// then combinational gates and `DTYPE` devices settle to a fixed
    /// point. Returns `false` (oscillation) if no fixed point is reached
    /// within [`MAX_STABILIZATION_PASSES`].
    pub fn execute_network(&mut self) -> bool {
        let order: Vec<NameId> = self.devices.order().to_vec();

        for &id in &order {
            if let Some(device) = self.devices.get_device_mut(id) {
                device.advance_cycle();
            }
        }

        for _pass in 0..MAX_STABILIZATION_PASSES {
            let mut any_changed = false;
            for &id in &order {
                let resolved = self.resolve_inputs(id);
                if let Some(device) = self.devices.get_device_mut(id) {
                    if device.settle(&resolved) {
                        any_changed = true;
                    }
                }
            }
            if !any_changed {
                return true;
            }
        }

        log::warn!("network failed to stabilize within {MAX_STABILIZATION_PASSES} passes");
        false
    }

    #[must_use]
    pub fn get_output_signal(&self, dev: NameId, port: PortId) -> Option<Signal> {
        match port {
            PortId::Output(output) => self.devices.get_device(dev)?.output(output),
            PortId::Input(_) => None,
        }
    }

    fn resolve_inputs(&self, id: NameId) -> HashMap<InputPort, Signal> {
        let mut resolved = HashMap::new();
        let Some(device) = self.devices.get_device(id) else { return resolved };
        for port in device.declared_inputs() {
            if let Some((src_dev, src_port)) = device.input_source(port) {
                if let Some(level) = self.source_output(src_dev, src_port) {
                    resolved.insert(port, level);
                }
            }
        }
        resolved
    }

    fn source_output(&self, src_dev: NameId, src_port: OutputPort) -> Option<Signal> {
        self.devices.get_device(src_dev).and_then(|d: &Device| d.output(src_port))
    }
}
