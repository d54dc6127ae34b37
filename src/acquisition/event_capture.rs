//! # Event Capture Loop
//!
//! Drains the meter's event buffer. Each pass reads one 15-register record
//! from the buffer, decodes it, seeks the waveform cursor to the record's
//! flash start and reads the twenty waveform samples that belong to it.
//!
//! The device has no "count" register, so the loop runs until the buffer
//! answers with an empty block or a busy exception. Both are normal ends of
//! a drain. Anything else aborts it, as does hitting the per-cycle ceiling.
//! Events completed before an abort are kept.

use std::fmt;

use log::{debug, error, info};

use crate::constants::{
    EVENT_BUFFER_ADDRESS, EVENT_RECORD_LEN, MAX_EVENTS_PER_CYCLE, WAVEFORM_CONTROL_ADDRESS,
    WAVEFORM_FIRST_ADDRESS, WAVEFORM_SAMPLES, WAVEFORM_SEEK_COMMAND, WAVEFORM_STRIDE,
};
use crate::error::PqError;
use crate::modbus::protocol::{pause, RegisterProtocol};
use crate::payload::{EventHeader, FlashPointer, PqEvent};

/// Where the waveform samples of the current event live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformLayout {
    pub control_address: u16,
    pub seek_command: u16,
    pub first_address: u16,
    pub stride: u16,
}

impl Default for WaveformLayout {
    fn default() -> Self {
        WaveformLayout {
            control_address: WAVEFORM_CONTROL_ADDRESS,
            seek_command: WAVEFORM_SEEK_COMMAND,
            first_address: WAVEFORM_FIRST_ADDRESS,
            stride: WAVEFORM_STRIDE,
        }
    }
}

impl WaveformLayout {
    /// Holding register of sample `index`.
    pub fn sample_address(&self, index: usize) -> Result<u16, PqError> {
        u16::try_from(index)
            .ok()
            .and_then(|index| self.stride.checked_mul(index))
            .and_then(|offset| self.first_address.checked_add(offset))
            .ok_or(PqError::SampleAddress { index })
    }

    /// Values written to the control pair to seek to `flash_start`.
    ///
    /// The control pair takes the command word and a 16-bit flash address,
    /// so a pointer with a non-zero high word cannot be seeked to.
    pub fn seek_words(&self, flash_start: FlashPointer) -> Result<[u16; 2], PqError> {
        match flash_start.registers() {
            (0, low) => Ok([self.seek_command, low]),
            _ => Err(PqError::SeekOutOfRange(flash_start)),
        }
    }
}

/// Normal end of a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    /// The buffer returned no registers.
    BufferEmpty,
    /// The device answered with its busy exception.
    DeviceBusy,
}

/// Abnormal end of a drain.
#[derive(Debug)]
pub enum AbortReason {
    /// An exchange failed for a reason other than "busy".
    Exchange(PqError),
    /// The per-cycle ceiling was reached before the buffer drained.
    ExceededMaxEvents(usize),
}

/// How a drain ended.
#[derive(Debug)]
pub enum Termination {
    Drained(DrainReason),
    Aborted(AbortReason),
}

impl Termination {
    pub fn is_drained(&self) -> bool {
        matches!(self, Termination::Drained(_))
    }

    fn from_error(error: PqError) -> Self {
        if error.is_device_busy() {
            Termination::Drained(DrainReason::DeviceBusy)
        } else {
            Termination::Aborted(AbortReason::Exchange(error))
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Termination::Drained(DrainReason::BufferEmpty) => write!(f, "drained (buffer empty)"),
            Termination::Drained(DrainReason::DeviceBusy) => write!(f, "drained (device busy)"),
            Termination::Aborted(AbortReason::Exchange(e)) => write!(f, "aborted: {e}"),
            Termination::Aborted(AbortReason::ExceededMaxEvents(max)) => {
                write!(f, "aborted: exceeded max events per cycle ({max})")
            }
        }
    }
}

/// Events captured by one drain and how it ended.
#[derive(Debug)]
pub struct CaptureReport {
    pub events: Vec<PqEvent>,
    pub termination: Termination,
}

/// Bounded event drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCapture {
    max_events: usize,
    layout: WaveformLayout,
}

impl Default for EventCapture {
    fn default() -> Self {
        EventCapture::new(MAX_EVENTS_PER_CYCLE)
    }
}

impl EventCapture {
    pub fn new(max_events: usize) -> Self {
        EventCapture {
            max_events,
            layout: WaveformLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: WaveformLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Drains the event buffer over `protocol`.
    pub async fn run(&self, protocol: &mut RegisterProtocol<'_>) -> CaptureReport {
        let mut events = Vec::new();

        let termination = loop {
            if events.len() >= self.max_events {
                break Termination::Aborted(AbortReason::ExceededMaxEvents(self.max_events));
            }

            let record = match protocol
                .read_holding_registers(EVENT_BUFFER_ADDRESS, EVENT_RECORD_LEN)
                .await
            {
                Ok(record) if record.is_empty() => {
                    break Termination::Drained(DrainReason::BufferEmpty)
                }
                Ok(record) => record,
                Err(e) => break Termination::from_error(e),
            };

            let header = match EventHeader::decode(&record) {
                Ok(header) => header,
                Err(e) => break Termination::Aborted(AbortReason::Exchange(e)),
            };

            let waveform = match self.fetch_waveform(protocol, header.flash_start).await {
                Ok(waveform) => waveform,
                Err(termination) => break termination,
            };

            info!(
                "Captured event type {} channel {} at {} (flash {})",
                header.event_type, header.event_channel, header.event_time, header.flash_start
            );
            events.push(header.with_waveform(waveform));

            pause(protocol.pacing().between_events).await;
        };

        match &termination {
            Termination::Drained(_) => info!("Event drain {termination}, {} events", events.len()),
            Termination::Aborted(_) => {
                error!("Event drain {termination}, keeping {} events", events.len())
            }
        }

        CaptureReport {
            events,
            termination,
        }
    }

    async fn fetch_waveform(
        &self,
        protocol: &mut RegisterProtocol<'_>,
        flash_start: FlashPointer,
    ) -> Result<[u16; WAVEFORM_SAMPLES], Termination> {
        let seek = self.layout.seek_words(flash_start).map_err(Termination::from_error)?;
        protocol
            .write_registers(self.layout.control_address, &seek)
            .await
            .map_err(Termination::from_error)?;
        pause(protocol.pacing().waveform_seek).await;

        let mut waveform = [0u16; WAVEFORM_SAMPLES];
        for (index, sample) in waveform.iter_mut().enumerate() {
            let address = self.layout.sample_address(index).map_err(Termination::from_error)?;
            let values = protocol
                .read_holding_registers(address, 1)
                .await
                .map_err(Termination::from_error)?;
            match values.first() {
                Some(value) => *sample = *value,
                None => {
                    debug!("Empty waveform reply at {address}, dropping partial event");
                    return Err(Termination::Drained(DrainReason::BufferEmpty));
                }
            }
        }
        Ok(waveform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_addresses() {
        let layout = WaveformLayout::default();
        assert_eq!(layout.sample_address(0).unwrap(), 6016);
        assert_eq!(layout.sample_address(1).unwrap(), 6022);
        assert_eq!(layout.sample_address(19).unwrap(), 6130);
    }

    #[test]
    fn test_sample_address_past_register_space() {
        let layout = WaveformLayout {
            first_address: 0xFFF0,
            ..WaveformLayout::default()
        };
        assert_eq!(layout.sample_address(2).unwrap(), 0xFFFC);
        assert!(matches!(
            layout.sample_address(3),
            Err(PqError::SampleAddress { index: 3 })
        ));
        assert!(matches!(
            layout.sample_address(usize::MAX),
            Err(PqError::SampleAddress { .. })
        ));
    }

    #[test]
    fn test_seek_words() {
        let layout = WaveformLayout::default();
        assert_eq!(layout.seek_words(FlashPointer(0xA2F0)).unwrap(), [0x1400, 0xA2F0]);
    }

    #[test]
    fn test_seek_rejects_pointer_above_16_bits() {
        let layout = WaveformLayout::default();
        assert!(matches!(
            layout.seek_words(FlashPointer(0x0001_A2F0)),
            Err(PqError::SeekOutOfRange(FlashPointer(0x0001_A2F0)))
        ));
        let err = layout.seek_words(FlashPointer(0x0001_0000)).unwrap_err();
        assert!(!err.is_device_busy());
        assert_eq!(
            err.to_string(),
            "Flash pointer 0x00010000 does not fit the waveform seek register"
        );
    }

    #[test]
    fn test_busy_error_drains() {
        let busy = PqError::Read {
            address: 4100,
            count: 15,
            fault: crate::error::ExchangeFault::Exception(6),
        };
        assert!(Termination::from_error(busy).is_drained());
        assert!(!Termination::from_error(PqError::NotConnected).is_drained());
    }

    #[test]
    fn test_termination_display() {
        let text = Termination::Aborted(AbortReason::ExceededMaxEvents(64)).to_string();
        assert_eq!(text, "aborted: exceeded max events per cycle (64)");
    }
}
