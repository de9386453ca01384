// Tests for movie recording and playback
mod utils;

#[cfg(test)]
mod tests {
    use super::utils::{RecordingSink, ScratchDir, ToyConsole};
    use mdfn_core::state::state_info;
    use mdfn_core::{FileMode, FileStream};
    use mdfn_runtime::{
        commands, scan_movie, MediaChange, MovieError, MovieMode, MovieSummary, NoticeType, RuntimeConfig, Session,
        SlotPaths, SlotResolver,
    };
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    fn config(dir: &Path) -> RuntimeConfig {
        RuntimeConfig {
            data_dir: dir.to_path_buf(),
            base_name: "toy".to_string(),
            ..RuntimeConfig::default()
        }
    }

    fn session(dir: &Path, console: ToyConsole) -> (Session<ToyConsole>, Rc<RecordingSink>) {
        let sink = Rc::new(RecordingSink::default());
        let session = Session::new(console, &config(dir), sink.clone());
        (session, sink)
    }

    fn movie_path(dir: &Path, slot: usize) -> PathBuf {
        SlotPaths::new(dir, "toy").movie_path(slot)
    }

    /// One frame: movie input first, then emulation with whatever the port holds.
    fn run_frame(session: &mut Session<ToyConsole>, input: [u8; 2]) -> [u8; 2] {
        let mut pad = input;
        let mut ports: [&mut [u8]; 1] = [&mut pad];
        session.frame_begin(&mut ports, false);
        session.module_mut().run_frame(&pad);
        pad
    }

    fn scan(path: &Path) -> MovieSummary {
        let mut stream = FileStream::open(path, FileMode::Read).unwrap();
        scan_movie(&mut stream, &[2]).unwrap()
    }

    #[test]
    fn test_record_toggle_writes_two_snapshots() {
        let dir = ScratchDir::new("toggle");
        let (mut session, sink) = session(dir.path(), ToyConsole::new());

        session.save_movie(None, None).unwrap();
        assert_eq!(session.movie().mode(), MovieMode::Recording);
        for i in 0..3 {
            run_frame(&mut session, [i, 0x55]);
        }
        session.save_movie(None, None).unwrap();
        assert_eq!(session.movie().mode(), MovieMode::Stopped);
        assert!(sink.has(NoticeType::Status, "Movie recording stopped."));

        let summary = scan(&movie_path(dir.path(), 0));
        assert_eq!(summary.snapshots, 2);
        assert_eq!(summary.frames, 3);
        assert!(!summary.truncated);
        assert_eq!(session.movie().recently_saved(), Some(0));
    }

    #[test]
    fn test_playback_reproduces_recording() {
        let dir = ScratchDir::new("playback");
        let inputs = [[3u8, 0x11], [0, 0x80], [7, 0x01], [1, 0xFF], [2, 0x42]];

        let (mut recorder, _) = session(dir.path(), ToyConsole::new());
        recorder.save_movie(None, None).unwrap();
        let mut recorded = Vec::new();
        for (i, input) in inputs.iter().enumerate() {
            run_frame(&mut recorder, *input);
            if i == 1 {
                recorder.do_simple_command(commands::RESET);
            }
            if i == 2 {
                recorder.set_media(MediaChange { media_idx: 1, ..MediaChange::default() }).unwrap();
            }
            recorded.push((recorder.module().counter, recorder.module().ram));
        }
        recorder.stop_movie();
        drop(recorder);

        let mut diverged = ToyConsole::new();
        diverged.counter = 999;
        let (mut player, sink) = session(dir.path(), diverged);
        player.load_movie(None).unwrap();
        assert_eq!(player.module().counter, 0);

        for (expected_input, expected_state) in inputs.iter().zip(&recorded) {
            let pad = run_frame(&mut player, [0, 0]);
            assert_eq!(&pad, expected_input);
            assert_eq!((player.module().counter, player.module().ram), *expected_state);
        }
        assert_eq!(player.module().commands, vec![commands::RESET]);
        assert_eq!(player.module().media.media_idx, 1);

        // Final snapshot, then end of data.
        run_frame(&mut player, [0, 0]);
        assert_eq!(player.movie().mode(), MovieMode::Stopped);
        assert!(sink.has(NoticeType::Status, "Movie playback stopped."));
        assert_eq!(sink.errors(), 0);
    }

    #[test]
    fn test_truncated_movie_stops_playback() {
        let dir = ScratchDir::new("truncated");
        let path = movie_path(dir.path(), 0);

        let (mut recorder, _) = session(dir.path(), ToyConsole::new());
        recorder.save_movie(None, None).unwrap();
        for i in 0..3 {
            run_frame(&mut recorder, [i, i]);
        }
        recorder.stop_movie();
        drop(recorder);

        // Cut the first frame record after its first port byte.
        let mut file = FileStream::open(&path, FileMode::Read).unwrap();
        let info = state_info(&mut file).unwrap();
        drop(file);
        let cut = info.payload_offset + u64::from(info.payload_len) + 2;
        std::fs::OpenOptions::new().write(true).open(&path).unwrap().set_len(cut).unwrap();

        let summary = scan(&path);
        assert!(summary.truncated);
        assert_eq!(summary.frames, 0);

        let (mut player, sink) = session(dir.path(), ToyConsole::new());
        player.load_movie(None).unwrap();
        run_frame(&mut player, [0, 0]);

        assert_eq!(player.movie().mode(), MovieMode::Stopped);
        assert!(sink.has(NoticeType::Error, "Movie 0 playback failed."));
        assert!(!player.movie().slots()[0].present);

        // Later frames are plain emulation.
        run_frame(&mut player, [0, 0]);
        assert_eq!(player.movie().mode(), MovieMode::Stopped);
    }

    #[test]
    fn test_record_during_playback_is_rejected() {
        let dir = ScratchDir::new("reject");
        let (mut session, sink) = session(dir.path(), ToyConsole::new());

        session.save_movie(None, None).unwrap();
        run_frame(&mut session, [1, 1]);
        session.stop_movie();

        session.load_movie(None).unwrap();
        let err = session.save_movie(None, None).unwrap_err();
        assert!(matches!(err, MovieError::RecordingDuringPlayback));
        assert_eq!(session.movie().mode(), MovieMode::Playing);
        assert!(sink.has(NoticeType::Error, "can't record movie during movie playback"));
    }

    #[test]
    fn test_play_during_recording_is_rejected() {
        let dir = ScratchDir::new("reject-play");
        let (mut session, _) = session(dir.path(), ToyConsole::new());

        session.save_movie(None, None).unwrap();
        let err = session.load_movie(None).unwrap_err();
        assert!(matches!(err, MovieError::PlaybackDuringRecording));
        assert!(session.movie().is_recording());
    }

    #[test]
    fn test_module_without_states_is_unsupported() {
        let dir = ScratchDir::new("unsupported");
        let mut console = ToyConsole::new();
        console.supports_states = false;
        let (mut session, sink) = session(dir.path(), console);

        let err = session.save_movie(None, None).unwrap_err();
        assert!(matches!(err, MovieError::Unsupported { .. }));
        assert_eq!(session.movie().mode(), MovieMode::Stopped);
        assert!(sink.has(NoticeType::Error, "doesn't support save states"));
        assert!(!movie_path(dir.path(), 0).exists());
    }

    #[test]
    fn test_netplay_blocks_playback() {
        let dir = ScratchDir::new("netplay");
        let (mut session, _) = session(dir.path(), ToyConsole::new());
        session.movie_mut().set_netplay_active(true);

        let err = session.load_movie(None).unwrap_err();
        assert!(matches!(err, MovieError::NetplayActive));
        // Save states don't perturb the toy console, so recording is fine.
        session.save_movie(None, None).unwrap();
        assert!(session.movie().is_recording());
    }

    #[test]
    fn test_current_movie_encodes_slot_and_mode() {
        let dir = ScratchDir::new("current");
        let (mut session, sink) = session(dir.path(), ToyConsole::new());

        session.select_movie(3);
        assert!(sink.movie_status.borrow().is_some());
        assert_eq!(session.movie().current_movie(), 0);

        session.save_movie(None, None).unwrap();
        assert_eq!(session.movie().current_movie(), 4);
        session.stop_movie();
        assert_eq!(session.movie().current_movie(), 0);

        session.load_movie(None).unwrap();
        assert_eq!(session.movie().current_movie(), -4);
        session.stop_movie();

        let explicit = dir.path().join("explicit.mcm");
        session.save_movie(Some(&explicit), None).unwrap();
        assert_eq!(session.movie().current_movie(), 0);
        assert!(session.movie().is_recording());
    }

    #[test]
    fn test_check_movies_finds_newest() {
        let dir = ScratchDir::new("check");
        let (mut recorder, _) = session(dir.path(), ToyConsole::new());
        for slot in [1, 5] {
            recorder.select_movie(slot);
            recorder.save_movie(None, None).unwrap();
            recorder.stop_movie();
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        drop(recorder);

        let (mut fresh, _) = session(dir.path(), ToyConsole::new());
        fresh.check_slots();
        let slots = fresh.movie().slots();
        assert!(slots[1].present && slots[5].present);
        assert!(!slots[0].present);
        assert_eq!(fresh.movie().recently_saved(), Some(5));
        assert_eq!(fresh.movie().current_slot(), 0);
    }

    #[test]
    fn test_corrupt_slot_headers_only_warn() {
        let dir = ScratchDir::new("corrupt-header");
        let mut raw = vec![0u8; 32];
        raw[..8].copy_from_slice(b"MDFNSVST");
        raw[24..28].copy_from_slice(&0x1000_0000u32.to_le_bytes());
        raw[28..32].copy_from_slice(&0x1000_0000u32.to_le_bytes());
        let paths = SlotPaths::new(dir.path(), "toy");
        std::fs::write(paths.movie_path(0), &raw).unwrap();
        std::fs::write(paths.state_path(0), &raw).unwrap();

        let (mut session, sink) = session(dir.path(), ToyConsole::new());
        session.check_slots();
        assert!(session.movie().slots()[0].present);
        assert!(session.slots().slots()[0].present);

        session.select_movie(0);
        assert!(sink.movie_status.borrow().is_none());
        session.select_state(0);
        assert!(sink.state_status.borrow().is_none());

        let truncated = sink
            .notices
            .borrow()
            .iter()
            .filter(|(kind, message)| *kind == NoticeType::Warning && message.contains("truncated"))
            .count();
        assert_eq!(truncated, 2);
        assert_eq!(sink.errors(), 0);

        let mut stream = FileStream::open(paths.movie_path(0), FileMode::Read).unwrap();
        assert!(scan_movie(&mut stream, &[2]).is_err());
    }

    #[test]
    fn test_rejected_media_change_fails_playback() {
        let dir = ScratchDir::new("media");
        let (mut recorder, _) = session(dir.path(), ToyConsole::new());
        recorder.save_movie(None, None).unwrap();
        run_frame(&mut recorder, [0, 0]);
        recorder.set_media(MediaChange { media_idx: 1, ..MediaChange::default() }).unwrap();
        run_frame(&mut recorder, [0, 0]);
        recorder.stop_movie();
        drop(recorder);

        // Same movie, but the player only has one disc.
        let mut console = ToyConsole::new();
        console.media_count = 1;
        let (mut player, sink) = session(dir.path(), console);
        player.load_movie(None).unwrap();
        run_frame(&mut player, [0, 0]);
        assert!(player.movie().is_playing());
        run_frame(&mut player, [0, 0]);
        assert_eq!(player.movie().mode(), MovieMode::Stopped);
        assert!(sink.has(NoticeType::Error, "untrusted media change rejected"));
    }
}
