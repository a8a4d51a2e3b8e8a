//! Reads the RFC 6464 audio-level header extension and pushes levels to
//! the installed listener. Never drops a packet.

use crate::event::{RtpExtensionKind, TransceiverEvent};
use crate::node::PacketProcessor;
use crate::packet::{AudioLevel, Packet, PacketInfo};
use std::sync::{Arc, Mutex};

pub type AudioLevelListener = Arc<dyn Fn(u32, AudioLevel) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct AudioLevelSlot(Arc<Mutex<Option<AudioLevelListener>>>);

impl AudioLevelSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, listener: AudioLevelListener) {
        *self.0.lock().unwrap() = Some(listener);
    }

    fn get(&self) -> Option<AudioLevelListener> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub(crate) struct AudioLevelReader {
    extension_id: Option<u8>,
    listener: AudioLevelSlot,
}

impl AudioLevelReader {
    pub(crate) fn new(listener: AudioLevelSlot) -> Self {
        Self {
            extension_id: None,
            listener,
        }
    }
}

impl PacketProcessor for AudioLevelReader {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        if let (Some(id), Packet::Audio(audio)) = (self.extension_id, &mut packet.packet) {
            let parsed = audio
                .rtp
                .extension(id)
                .and_then(rtp::extension::parse_audio_level);
            if let Some((voice_activity, level)) = parsed {
                let level = AudioLevel {
                    voice_activity,
                    level,
                };
                audio.level = Some(level);
                if let Some(listener) = self.listener.get() {
                    listener(audio.rtp.header.ssrc, level);
                }
            }
        }
        out.push(packet);
    }

    fn handle_event(&mut self, event: &TransceiverEvent) {
        match event {
            TransceiverEvent::RtpExtensionAdded {
                id,
                kind: RtpExtensionKind::AudioLevel,
            } => self.extension_id = Some(*id),
            TransceiverEvent::RtpExtensionsCleared => self.extension_id = None,
            _ => {}
        }
    }
}
