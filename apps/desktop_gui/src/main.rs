use std::{
    collections::HashMap,
    path::PathBuf,
    thread,
    time::Instant,
};

mod backend_bridge;
mod controller;
mod entity_form;
mod radial_menu;

use client_core::{ClientEvent, EntityWriter, FluxClient, ServiceEndpoints, MIN_PASSWORD_LEN};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use eframe::egui;
use egui::TextureHandle;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{EntityKind, UserId},
    error::ErrorKind,
    protocol::{AuthSession, EntityRecord, NewEntity, UserProfile},
};

use backend_bridge::commands::BackendCommand;
use controller::events::{err_label, DecodedImage, UiError, UiErrorContext, UiEvent};
use controller::orchestration::dispatch_backend_command;
use entity_form::EntityCreationFlow;
use radial_menu::{action_icon, MenuAction, RadialMenuController, MENU_ITEMS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppViewState {
    SignIn,
    SignUp,
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MainTab {
    Sites,
    Stores,
    Profile,
}

impl MainTab {
    fn kind(self) -> Option<EntityKind> {
        match self {
            MainTab::Sites => Some(EntityKind::Site),
            MainTab::Stores => Some(EntityKind::Store),
            MainTab::Profile => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            MainTab::Sites => "Sites",
            MainTab::Stores => "Stores",
            MainTab::Profile => "Profile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusBannerSeverity {
    Error,
}

#[derive(Debug, Clone)]
struct StatusBanner {
    severity: StatusBannerSeverity,
    message: String,
}

fn status_for_error(err: &UiError) -> String {
    format!("{} error: {}", err_label(err.kind()), err.message())
}

enum ImageState {
    Loading,
    Ready {
        image: DecodedImage,
        texture: Option<TextureHandle>,
    },
    Failed(String),
}

const SETTINGS_STORAGE_KEY: &str = "flux_desktop.settings";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct PersistedSettings {
    remembered_email: String,
}

struct FluxApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,

    view_state: AppViewState,
    active_tab: MainTab,
    /// Last entity section the user looked at; the add action targets this
    /// even when the profile tab is showing.
    section: EntityKind,

    email: String,
    password: String,
    signup_display_name: String,
    signup_password_confirm: String,
    auth_busy: bool,

    session: Option<AuthSession>,
    profile: Option<UserProfile>,
    display_name_draft: String,

    password_modal_open: bool,
    current_password: String,
    new_password: String,
    new_password_confirm: String,
    password_busy: bool,
    confirm_sign_out: bool,

    entities: HashMap<EntityKind, Vec<EntityRecord>>,
    images: HashMap<String, ImageState>,

    radial: RadialMenuController,
    creation: EntityCreationFlow,

    status: String,
    status_banner: Option<StatusBanner>,
}

impl FluxApp {
    fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        persisted: Option<PersistedSettings>,
    ) -> Self {
        let persisted = persisted.unwrap_or_default();
        Self {
            cmd_tx,
            ui_rx,
            view_state: AppViewState::SignIn,
            active_tab: MainTab::Sites,
            section: EntityKind::Site,
            email: persisted.remembered_email,
            password: String::new(),
            signup_display_name: String::new(),
            signup_password_confirm: String::new(),
            auth_busy: false,
            session: None,
            profile: None,
            display_name_draft: String::new(),
            password_modal_open: false,
            current_password: String::new(),
            new_password: String::new(),
            new_password_confirm: String::new(),
            password_busy: false,
            confirm_sign_out: false,
            entities: HashMap::new(),
            images: HashMap::new(),
            radial: RadialMenuController::new(),
            creation: EntityCreationFlow::new(),
            status: "Not signed in".to_string(),
            status_banner: None,
        }
    }

    fn queue(&mut self, cmd: BackendCommand) {
        dispatch_backend_command(&self.cmd_tx, cmd, &mut self.status);
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::SignedIn(session) => {
                    self.auth_busy = false;
                    self.password.clear();
                    self.signup_password_confirm.clear();
                    self.display_name_draft = session.display_name.clone();
                    self.email = session.email.clone();
                    self.session = Some(session);
                    self.view_state = AppViewState::Main;
                    self.active_tab = MainTab::Sites;
                    self.section = EntityKind::Site;
                    self.entities.clear();
                    self.images.clear();
                    self.status = "Signed in".to_string();
                    self.status_banner = None;
                    self.queue(BackendCommand::WatchEntities {
                        kind: EntityKind::Site,
                    });
                    self.queue(BackendCommand::WatchEntities {
                        kind: EntityKind::Store,
                    });
                    self.queue(BackendCommand::LoadProfile);
                }
                UiEvent::SignedOut => {
                    self.sign_out_locally();
                }
                UiEvent::Info(message) => {
                    self.status = message;
                }
                UiEvent::Error(err) => {
                    self.auth_busy = false;
                    if err.context() == UiErrorContext::PasswordChange {
                        self.password_busy = false;
                    }
                    // A session the provider no longer accepts drops the
                    // user back to sign-in. Auth failures on the auth
                    // screens themselves (wrong password, wrong current
                    // password) stay where they are.
                    let session_rejected = err.kind() == ErrorKind::NoSession
                        || (err.requires_reauth()
                            && self.session.is_some()
                            && matches!(
                                err.context(),
                                UiErrorContext::Profile
                                    | UiErrorContext::CreateEntity
                                    | UiErrorContext::General
                            ));
                    if session_rejected {
                        self.sign_out_locally();
                        self.queue(BackendCommand::SignOut);
                    }
                    self.status = status_for_error(&err);
                    if matches!(
                        err.context(),
                        UiErrorContext::SignIn
                            | UiErrorContext::SignUp
                            | UiErrorContext::PasswordChange
                            | UiErrorContext::BackendStartup
                    ) {
                        self.status_banner = Some(StatusBanner {
                            severity: StatusBannerSeverity::Error,
                            message: self.status.clone(),
                        });
                    }
                }
                UiEvent::EntitiesSnapshot { kind, entities } => {
                    self.entities.insert(kind, entities);
                }
                UiEvent::EntityCreated { kind, entity_id } => {
                    tracing::info!(entity_id = %entity_id, "entity created");
                    self.creation.submit_succeeded();
                    self.status = format!("{} created", kind.label());
                }
                UiEvent::EntityCreateFailed { kind, error } => {
                    self.creation.submit_failed();
                    self.status = format!(
                        "Could not create {}: {}",
                        kind.label().to_ascii_lowercase(),
                        error.message()
                    );
                    if self.creation.is_open() {
                        self.status_banner = Some(StatusBanner {
                            severity: StatusBannerSeverity::Error,
                            message: self.status.clone(),
                        });
                    }
                }
                UiEvent::ProfileLoaded(profile) => {
                    self.display_name_draft = profile.display_name.clone();
                    self.profile = Some(profile);
                }
                UiEvent::DisplayNameSaved(display_name) => {
                    if let Some(profile) = self.profile.as_mut() {
                        profile.display_name = display_name.clone();
                    }
                    if let Some(session) = self.session.as_mut() {
                        session.display_name = display_name;
                    }
                    self.status = "Display name saved".to_string();
                }
                UiEvent::AvatarUploaded(url) => {
                    if let Some(profile) = self.profile.as_mut() {
                        profile.photo_url = Some(url.clone());
                    }
                    if let Some(session) = self.session.as_mut() {
                        session.photo_url = Some(url.clone());
                    }
                    // Force a refetch of the new avatar.
                    self.images.remove(&url);
                    self.status = "Profile photo updated".to_string();
                }
                UiEvent::PasswordChanged => {
                    self.password_busy = false;
                    self.password_modal_open = false;
                    self.current_password.clear();
                    self.new_password.clear();
                    self.new_password_confirm.clear();
                    self.status = "Password changed".to_string();
                    self.status_banner = None;
                }
                UiEvent::ImageLoaded { url, image } => {
                    self.images.insert(
                        url,
                        ImageState::Ready {
                            image,
                            texture: None,
                        },
                    );
                }
                UiEvent::ImageLoadFailed { url, reason } => {
                    self.images.insert(url, ImageState::Failed(reason));
                }
            }
        }
    }

    fn sign_out_locally(&mut self) {
        self.session = None;
        self.profile = None;
        self.entities.clear();
        self.images.clear();
        self.password.clear();
        self.current_password.clear();
        self.new_password.clear();
        self.new_password_confirm.clear();
        self.password_modal_open = false;
        self.password_busy = false;
        self.confirm_sign_out = false;
        self.auth_busy = false;
        self.creation.cancel();
        self.creation.cancel_scheduled_open();
        self.radial = RadialMenuController::new();
        self.view_state = AppViewState::SignIn;
        self.status = "Signed out".to_string();
        self.status_banner = None;
    }

    fn try_sign_in(&mut self) {
        if self.auth_busy {
            return;
        }
        self.auth_busy = true;
        self.status = "Signing in...".to_string();
        let cmd = BackendCommand::SignIn {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        };
        self.queue(cmd);
    }

    fn try_sign_up(&mut self) {
        if self.auth_busy {
            return;
        }
        if self.password != self.signup_password_confirm {
            self.status = "Passwords do not match".to_string();
            self.status_banner = Some(StatusBanner {
                severity: StatusBannerSeverity::Error,
                message: self.status.clone(),
            });
            return;
        }
        self.auth_busy = true;
        self.status = "Creating account...".to_string();
        let cmd = BackendCommand::SignUp {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
            display_name: self.signup_display_name.trim().to_string(),
        };
        self.queue(cmd);
    }

    fn show_status_banner(&mut self, ui: &mut egui::Ui) {
        let Some(banner) = self.status_banner.clone() else {
            return;
        };
        let fill = match banner.severity {
            StatusBannerSeverity::Error => egui::Color32::from_rgb(90, 30, 34),
        };
        egui::Frame::none()
            .fill(fill)
            .rounding(8.0)
            .inner_margin(egui::Margin::symmetric(10, 8))
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label(
                        egui::RichText::new(&banner.message).color(egui::Color32::WHITE),
                    );
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("Dismiss").clicked() {
                            self.status_banner = None;
                        }
                    });
                });
            });
        ui.add_space(6.0);
    }

    fn auth_card(
        &mut self,
        ctx: &egui::Context,
        add_contents: impl FnOnce(&mut Self, &mut egui::Ui),
    ) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let avail = ui.available_size();
            let card_width = avail.x.clamp(380.0, 480.0);
            ui.add_space((avail.y * 0.14).clamp(18.0, 120.0));
            ui.vertical_centered(|ui| {
                ui.set_width(card_width);
                egui::Frame::none()
                    .fill(ui.visuals().faint_bg_color)
                    .rounding(14.0)
                    .stroke(egui::Stroke::new(
                        1.0,
                        ui.visuals().widgets.noninteractive.bg_stroke.color,
                    ))
                    .inner_margin(egui::Margin::symmetric(20, 18))
                    .show(ui, |ui| {
                        ui.style_mut().spacing.item_spacing = egui::vec2(10.0, 10.0);
                        add_contents(self, ui);
                        ui.add_space(8.0);
                        ui.separator();
                        ui.horizontal_wrapped(|ui| {
                            ui.small("Status:");
                            ui.small(egui::RichText::new(&self.status).weak());
                        });
                    });
            });
        });
    }

    fn show_sign_in_screen(&mut self, ctx: &egui::Context) {
        self.auth_card(ctx, |app, ui| {
            ui.heading("Flux");
            ui.weak("Sign in to manage your sites and stores.");
            ui.add_space(6.0);
            app.show_status_banner(ui);

            ui.label("Email");
            let email_resp = ui.add(
                egui::TextEdit::singleline(&mut app.email)
                    .id_source("sign_in_email")
                    .hint_text("you@example.com")
                    .desired_width(f32::INFINITY),
            );
            ui.label("Password");
            let password_resp = ui.add(
                egui::TextEdit::singleline(&mut app.password)
                    .id_source("sign_in_password")
                    .password(true)
                    .desired_width(f32::INFINITY),
            );

            let enter = ui.input(|i| i.key_pressed(egui::Key::Enter));
            if enter && (email_resp.has_focus() || password_resp.has_focus()) {
                app.try_sign_in();
            }

            ui.add_space(4.0);
            let button = egui::Button::new(egui::RichText::new("Sign in").strong())
                .min_size(egui::vec2(ui.available_width(), 36.0));
            if ui.add_enabled(!app.auth_busy, button).clicked() {
                app.try_sign_in();
            }
            if ui.link("No account yet? Create one").clicked() {
                app.view_state = AppViewState::SignUp;
                app.status_banner = None;
            }
        });
    }

    fn show_sign_up_screen(&mut self, ctx: &egui::Context) {
        self.auth_card(ctx, |app, ui| {
            ui.heading("Create your account");
            ui.add_space(6.0);
            app.show_status_banner(ui);

            ui.label("Display name");
            ui.add(
                egui::TextEdit::singleline(&mut app.signup_display_name)
                    .id_source("sign_up_display_name")
                    .desired_width(f32::INFINITY),
            );
            ui.label("Email");
            ui.add(
                egui::TextEdit::singleline(&mut app.email)
                    .id_source("sign_up_email")
                    .desired_width(f32::INFINITY),
            );
            ui.label("Password");
            ui.add(
                egui::TextEdit::singleline(&mut app.password)
                    .id_source("sign_up_password")
                    .password(true)
                    .desired_width(f32::INFINITY),
            );
            ui.label("Confirm password");
            ui.add(
                egui::TextEdit::singleline(&mut app.signup_password_confirm)
                    .id_source("sign_up_password_confirm")
                    .password(true)
                    .desired_width(f32::INFINITY),
            );

            ui.add_space(4.0);
            let button = egui::Button::new(egui::RichText::new("Sign up").strong())
                .min_size(egui::vec2(ui.available_width(), 36.0));
            if ui.add_enabled(!app.auth_busy, button).clicked() {
                app.try_sign_up();
            }
            if ui.link("Already have an account? Sign in").clicked() {
                app.view_state = AppViewState::SignIn;
                app.status_banner = None;
            }
        });
    }

    fn show_main(&mut self, ctx: &egui::Context, now: Instant) {
        egui::TopBottomPanel::top("flux_tabs").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                for tab in [MainTab::Sites, MainTab::Stores, MainTab::Profile] {
                    if ui
                        .selectable_label(self.active_tab == tab, tab.label())
                        .clicked()
                    {
                        self.active_tab = tab;
                        if let Some(kind) = tab.kind() {
                            self.section = kind;
                        }
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.small(egui::RichText::new(&self.status).weak());
                });
            });
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_status_banner(ui);
            match self.active_tab {
                MainTab::Sites => self.show_entity_list(ui, ctx, EntityKind::Site),
                MainTab::Stores => self.show_entity_list(ui, ctx, EntityKind::Store),
                MainTab::Profile => self.show_profile_tab(ui, ctx),
            }
        });

        self.show_radial_menu(ctx, now);
        if self.creation.is_open() {
            self.show_creation_modal(ctx);
        }
        if self.password_modal_open {
            self.show_password_modal(ctx);
        }
        if self.confirm_sign_out {
            self.show_sign_out_prompt(ctx);
        }
    }

    fn show_sign_out_prompt(&mut self, ctx: &egui::Context) {
        egui::Window::new("Sign out")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label("Sign out of Flux?");
                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    if ui.button("Sign out").clicked() {
                        self.confirm_sign_out = false;
                        self.queue(BackendCommand::SignOut);
                    }
                    if ui.button("Cancel").clicked() {
                        self.confirm_sign_out = false;
                    }
                });
            });
    }

    fn show_entity_list(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, kind: EntityKind) {
        ui.horizontal(|ui| {
            ui.heading(format!("Your {}", kind.collection_name()));
            if ui.small_button("Refresh").clicked() {
                dispatch_backend_command(
                    &self.cmd_tx,
                    BackendCommand::RefreshEntities { kind },
                    &mut self.status,
                );
            }
        });
        ui.add_space(6.0);

        let records = self.entities.get(&kind).cloned().unwrap_or_default();
        if records.is_empty() {
            ui.weak(format!(
                "No {} yet. Use the + menu to add one.",
                kind.collection_name()
            ));
            return;
        }

        egui::ScrollArea::vertical().show(ui, |ui| {
            for record in &records {
                egui::Frame::none()
                    .fill(ui.visuals().faint_bg_color)
                    .rounding(10.0)
                    .inner_margin(egui::Margin::symmetric(12, 10))
                    .show(ui, |ui| {
                        ui.horizontal(|ui| {
                            self.show_record_image(ui, ctx, record.image_url.as_deref());
                            ui.vertical(|ui| {
                                ui.label(egui::RichText::new(record.name.as_str()).strong());
                                ui.weak(record.location.as_str());
                                ui.small(format!(
                                    "{} member(s) · created {}",
                                    record.members.len(),
                                    record.created_at.format("%Y-%m-%d %H:%M")
                                ));
                            });
                        });
                    });
                ui.add_space(6.0);
            }
        });
    }

    fn show_record_image(
        &mut self,
        ui: &mut egui::Ui,
        ctx: &egui::Context,
        image_url: Option<&str>,
    ) {
        let size = egui::vec2(56.0, 56.0);
        let Some(url) = image_url else {
            ui.allocate_ui(size, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.label(egui::RichText::new("🖼").size(24.0));
                });
            });
            return;
        };
        match self.texture_for(ctx, url) {
            Some(texture) => {
                ui.image((texture.id(), size));
            }
            None => {
                ui.allocate_ui(size, |ui| {
                    ui.centered_and_justified(|ui| {
                        ui.spinner();
                    });
                });
            }
        }
    }

    /// Returns the texture for a hosted image, scheduling a fetch and decode
    /// on the worker the first time a URL is seen.
    fn texture_for(&mut self, ctx: &egui::Context, url: &str) -> Option<TextureHandle> {
        if !self.images.contains_key(url) {
            self.images.insert(url.to_string(), ImageState::Loading);
            dispatch_backend_command(
                &self.cmd_tx,
                BackendCommand::FetchImage {
                    url: url.to_string(),
                },
                &mut self.status,
            );
            return None;
        }
        match self.images.get_mut(url) {
            None | Some(ImageState::Loading) | Some(ImageState::Failed(_)) => None,
            Some(ImageState::Ready { image, texture }) => {
                if texture.is_none() {
                    let color_image = egui::ColorImage::from_rgba_unmultiplied(
                        [image.width, image.height],
                        &image.rgba,
                    );
                    *texture = Some(ctx.load_texture(
                        url.to_string(),
                        color_image,
                        egui::TextureOptions::LINEAR,
                    ));
                }
                texture.clone()
            }
        }
    }

    fn show_profile_tab(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let Some(profile) = self.profile.clone() else {
            ui.weak("Loading profile...");
            return;
        };

        ui.horizontal(|ui| {
            match profile
                .photo_url
                .as_deref()
                .and_then(|url| self.texture_for(ctx, url))
            {
                Some(texture) => {
                    ui.image((texture.id(), egui::vec2(72.0, 72.0)));
                }
                None => {
                    ui.label(egui::RichText::new("👤").size(48.0));
                }
            }
            ui.vertical(|ui| {
                ui.heading(profile.display_name.as_str());
                ui.weak(profile.email.as_str());
                if ui.small_button("Change photo...").clicked() {
                    if let Some(path) = pick_image_file() {
                        dispatch_backend_command(
                            &self.cmd_tx,
                            BackendCommand::UploadAvatar { path },
                            &mut self.status,
                        );
                        self.status = "Uploading photo...".to_string();
                    }
                }
            });
        });

        ui.add_space(10.0);
        ui.separator();
        ui.add_space(10.0);

        ui.label("Display name");
        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(&mut self.display_name_draft)
                    .id_source("profile_display_name")
                    .desired_width(260.0),
            );
            let changed = self.display_name_draft.trim() != profile.display_name
                && !self.display_name_draft.trim().is_empty();
            if ui.add_enabled(changed, egui::Button::new("Save")).clicked() {
                let display_name = self.display_name_draft.trim().to_string();
                dispatch_backend_command(
                    &self.cmd_tx,
                    BackendCommand::SaveDisplayName { display_name },
                    &mut self.status,
                );
            }
        });

        ui.add_space(12.0);
        ui.horizontal(|ui| {
            if ui.button("Change password...").clicked() {
                self.password_modal_open = true;
                self.status_banner = None;
            }
            if ui.button("Sign out").clicked() {
                self.confirm_sign_out = true;
            }
        });
    }

    fn show_password_modal(&mut self, ctx: &egui::Context) {
        let mut open = self.password_modal_open;
        egui::Window::new("Change password")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.set_width(300.0);
                self.show_status_banner(ui);

                ui.label("Current password");
                ui.add(
                    egui::TextEdit::singleline(&mut self.current_password)
                        .id_source("password_current")
                        .password(true)
                        .desired_width(f32::INFINITY),
                );
                ui.label("New password");
                ui.add(
                    egui::TextEdit::singleline(&mut self.new_password)
                        .id_source("password_new")
                        .password(true)
                        .desired_width(f32::INFINITY),
                );
                ui.label("Confirm new password");
                ui.add(
                    egui::TextEdit::singleline(&mut self.new_password_confirm)
                        .id_source("password_confirm")
                        .password(true)
                        .desired_width(f32::INFINITY),
                );

                let matches = self.new_password == self.new_password_confirm;
                let long_enough = self.new_password.len() >= MIN_PASSWORD_LEN;
                if !matches && !self.new_password_confirm.is_empty() {
                    ui.colored_label(ui.visuals().warn_fg_color, "Passwords do not match");
                } else if !long_enough && !self.new_password.is_empty() {
                    ui.colored_label(
                        ui.visuals().warn_fg_color,
                        format!("Use at least {MIN_PASSWORD_LEN} characters"),
                    );
                }

                ui.add_space(6.0);
                let can_change = matches
                    && long_enough
                    && !self.current_password.is_empty()
                    && !self.password_busy;
                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(can_change, egui::Button::new("Change password"))
                        .clicked()
                    {
                        self.password_busy = true;
                        self.status = "Changing password...".to_string();
                        let cmd = BackendCommand::ChangePassword {
                            current_password: self.current_password.clone(),
                            new_password: self.new_password.clone(),
                        };
                        dispatch_backend_command(&self.cmd_tx, cmd, &mut self.status);
                    }
                    if self.password_busy {
                        ui.spinner();
                    }
                });
            });
        self.password_modal_open = open && self.password_modal_open;
    }

    fn show_creation_modal(&mut self, ctx: &egui::Context) {
        let Some(kind) = self.creation.kind() else {
            return;
        };
        egui::Window::new(format!("New {}", kind.label()))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.set_width(320.0);
                self.show_status_banner(ui);

                ui.label("Name");
                ui.add(
                    egui::TextEdit::singleline(&mut self.creation.draft_mut().name)
                        .id_source("entity_name")
                        .desired_width(f32::INFINITY),
                );
                ui.label("Location");
                ui.add(
                    egui::TextEdit::singleline(&mut self.creation.draft_mut().location)
                        .id_source("entity_location")
                        .desired_width(f32::INFINITY),
                );

                ui.add_space(4.0);
                ui.horizontal(|ui| {
                    if ui.button("Choose image...").clicked() {
                        if let Some(path) = pick_image_file() {
                            self.creation.draft_mut().local_image = Some(path);
                        }
                    }
                    match &self.creation.draft().local_image {
                        Some(path) => {
                            ui.weak(
                                path.file_name()
                                    .map(|name| name.to_string_lossy().into_owned())
                                    .unwrap_or_else(|| path.display().to_string()),
                            );
                            if ui.small_button("Remove").clicked() {
                                self.creation.draft_mut().local_image = None;
                            }
                        }
                        None => {
                            ui.weak("optional");
                        }
                    }
                });

                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    let submit = egui::Button::new(egui::RichText::new("Create").strong());
                    if ui.add_enabled(self.creation.can_submit(), submit).clicked() {
                        if let Some((kind, draft)) = self.creation.begin_submit() {
                            self.status = format!("Creating {}...", kind.label().to_ascii_lowercase());
                            dispatch_backend_command(
                                &self.cmd_tx,
                                BackendCommand::CreateEntity { kind, draft },
                                &mut self.status,
                            );
                        }
                    }
                    if self.creation.is_pending() {
                        ui.spinner();
                    }
                    if ui.button("Cancel").clicked() {
                        self.creation.cancel();
                        self.status_banner = None;
                    }
                });
            });
    }

    fn show_radial_menu(&mut self, ctx: &egui::Context, now: Instant) {
        let screen = ctx.screen_rect();
        let center = egui::pos2(screen.right() - 64.0, screen.bottom() - 64.0);

        egui::Area::new(egui::Id::new("radial_menu"))
            .fixed_pos(egui::pos2(0.0, 0.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                let painter = ui.painter().clone();
                let accent = ui.visuals().selection.bg_fill;
                let opacity = self.radial.item_opacity(now);
                let scale = self.radial.item_scale(now);
                let alpha = (opacity.clamp(0.0, 1.0) * 255.0) as u8;

                if scale > 0.0 {
                    for item in &MENU_ITEMS {
                        let (dx, dy) = self.radial.item_offset(item, now);
                        let pos = center + egui::vec2(dx, dy);
                        let radius = 22.0 * scale;
                        painter.circle_filled(
                            pos,
                            radius,
                            egui::Color32::from_rgba_unmultiplied(50, 54, 62, alpha),
                        );
                        painter.text(
                            pos,
                            egui::Align2::CENTER_CENTER,
                            action_icon(item.action, self.section),
                            egui::FontId::proportional((16.0 * scale).max(1.0)),
                            egui::Color32::from_rgba_unmultiplied(255, 255, 255, alpha),
                        );

                        // Items only become hit-testable once mostly faded
                        // in, mirroring the opacity-driven interactivity.
                        if opacity > 0.5 {
                            let rect = egui::Rect::from_center_size(
                                pos,
                                egui::vec2(radius * 2.0, radius * 2.0),
                            );
                            let id =
                                egui::Id::new(("radial_item", item.angle_degrees as i32));
                            if ui.interact(rect, id, egui::Sense::click()).clicked() {
                                if let Some(action) = self.radial.activate(item.action, now) {
                                    self.handle_menu_action(action, now);
                                }
                            }
                        }
                    }
                }

                let control_rect =
                    egui::Rect::from_center_size(center, egui::vec2(52.0, 52.0));
                let response = ui.interact(
                    control_rect,
                    egui::Id::new("radial_toggle"),
                    egui::Sense::click(),
                );
                painter.circle_filled(center, 26.0, accent);
                let galley = painter.layout_no_wrap(
                    "+".to_string(),
                    egui::FontId::proportional(30.0),
                    egui::Color32::WHITE,
                );
                let mut text = egui::epaint::TextShape::new(
                    center - galley.size() / 2.0,
                    galley,
                    egui::Color32::WHITE,
                );
                text.angle = self.radial.control_rotation_degrees(now).to_radians();
                painter.add(text);

                if response.clicked() {
                    self.radial.toggle(now);
                }
            });
    }

    fn handle_menu_action(&mut self, action: MenuAction, now: Instant) {
        match action {
            MenuAction::GoHome => {
                self.active_tab = MainTab::Sites;
                self.section = EntityKind::Site;
            }
            MenuAction::OpenProfile => {
                self.active_tab = MainTab::Profile;
            }
            MenuAction::AddEntity => {
                if !self.creation.schedule_open(self.section, now) {
                    self.status = "Finish the current submission first".to_string();
                }
            }
        }
    }
}

impl eframe::App for FluxApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.process_ui_events();
        self.radial.settle(now);
        if self.creation.poll(now) {
            self.status_banner = None;
        }

        match self.view_state {
            AppViewState::SignIn => self.show_sign_in_screen(ctx),
            AppViewState::SignUp => self.show_sign_up_screen(ctx),
            AppViewState::Main => self.show_main(ctx, now),
        }

        let animating = self.radial.is_animating(now)
            || self.creation.has_scheduled_open()
            || self.creation.is_pending()
            || self.auth_busy
            || self.password_busy;
        if animating {
            ctx.request_repaint_after(std::time::Duration::from_millis(16));
        } else {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let settings = PersistedSettings {
            remembered_email: self.email.clone(),
        };
        if let Ok(serialized) = serde_json::to_string(&settings) {
            storage.set_string(SETTINGS_STORAGE_KEY, serialized);
        }
    }
}

fn pick_image_file() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Images", &["png", "jpg", "jpeg", "gif", "webp", "bmp"])
        .pick_file()
}

/// Service configuration: a runtime environment variable wins, then the
/// value compiled in at build time. Base URLs are only overridable at
/// runtime, for pointing a build at local emulators.
fn setting(name: &str, compiled: Option<&str>) -> Result<String, String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => return Ok(value),
        _ => {}
    }
    match compiled {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => Err(format!(
            "{name} is not configured; export it or set it at build time"
        )),
    }
}

fn resolve_endpoints() -> Result<ServiceEndpoints, String> {
    let api_key = setting("FLUX_API_KEY", option_env!("FLUX_API_KEY"))?;
    let project_id = setting("FLUX_PROJECT_ID", option_env!("FLUX_PROJECT_ID"))?;
    let cloud_name = setting("FLUX_CLOUD_NAME", option_env!("FLUX_CLOUD_NAME"))?;
    let upload_preset = setting("FLUX_UPLOAD_PRESET", option_env!("FLUX_UPLOAD_PRESET"))?;

    let mut endpoints =
        ServiceEndpoints::production(api_key, project_id, cloud_name, upload_preset);
    if let Ok(url) = std::env::var("FLUX_IDENTITY_URL") {
        endpoints.identity_url = url;
    }
    if let Ok(url) = std::env::var("FLUX_DOCUMENTS_URL") {
        endpoints.documents_url = url;
    }
    if let Ok(url) = std::env::var("FLUX_MEDIA_URL") {
        endpoints.media_url = url;
    }
    Ok(endpoints)
}

fn decode_image(bytes: &[u8]) -> Result<DecodedImage, String> {
    let decoded = image::load_from_memory(bytes).map_err(|err| err.to_string())?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        width: width as usize,
        height: height as usize,
        rgba: rgba.into_raw(),
    })
}

fn upload_filename(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string())
}

/// Pushes one client event into the UI queue. A full queue drops the event
/// (the next snapshot carries the same state); only a disconnected receiver
/// ends forwarding.
fn forward_client_event(ui_tx: &Sender<UiEvent>, event: ClientEvent) -> bool {
    let forwarded = match event {
        ClientEvent::EntitiesSnapshot { kind, entities } => {
            UiEvent::EntitiesSnapshot { kind, entities }
        }
        ClientEvent::SubscriptionError { kind, message } => UiEvent::Error(UiError::from_message(
            UiErrorContext::General,
            format!("{} subscription failed: {message}", kind.collection_name()),
        )),
    };
    match ui_tx.try_send(forwarded) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!("ui event queue full; dropping a client event");
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

fn spawn_backend_thread(cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let endpoints = match resolve_endpoints() {
                Ok(endpoints) => endpoints,
                Err(message) => {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        format!("backend worker startup failure: {message}"),
                    )));
                    tracing::error!("service configuration missing: {message}");
                    return;
                }
            };
            let client = match FluxClient::new(endpoints) {
                Ok(client) => client,
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        format!("backend worker startup failure: {err}"),
                    )));
                    return;
                }
            };

            let _ = ui_tx.try_send(UiEvent::Info("Backend worker ready".to_string()));

            // Forward collection snapshots from the client's broadcast
            // channel into the UI event queue.
            let mut events = client.subscribe_events();
            let snapshot_tx = ui_tx.clone();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if !forward_client_event(&snapshot_tx, event) {
                        break;
                    }
                }
            });

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    BackendCommand::SignIn { email, password } => {
                        match client.sign_in(&email, &password).await {
                            Ok(session) => {
                                let _ = ui_tx.try_send(UiEvent::SignedIn(session));
                            }
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_client(
                                    UiErrorContext::SignIn,
                                    &err,
                                )));
                            }
                        }
                    }
                    BackendCommand::SignUp {
                        email,
                        password,
                        display_name,
                    } => match client.sign_up(&email, &password, &display_name).await {
                        Ok(session) => {
                            let _ = ui_tx.try_send(UiEvent::SignedIn(session));
                        }
                        Err(err) => {
                            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_client(
                                UiErrorContext::SignUp,
                                &err,
                            )));
                        }
                    },
                    BackendCommand::SignOut => {
                        client.sign_out().await;
                        let _ = ui_tx.try_send(UiEvent::SignedOut);
                    }
                    BackendCommand::LoadProfile => match client.load_profile().await {
                        Ok(profile) => {
                            let _ = ui_tx.try_send(UiEvent::ProfileLoaded(profile));
                        }
                        Err(err) => {
                            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_client(
                                UiErrorContext::Profile,
                                &err,
                            )));
                        }
                    },
                    BackendCommand::SaveDisplayName { display_name } => {
                        match client.save_display_name(&display_name).await {
                            Ok(()) => {
                                let _ = ui_tx
                                    .try_send(UiEvent::DisplayNameSaved(display_name));
                            }
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_client(
                                    UiErrorContext::Profile,
                                    &err,
                                )));
                            }
                        }
                    }
                    BackendCommand::ChangePassword {
                        current_password,
                        new_password,
                    } => {
                        let outcome = async {
                            client.reauthenticate(&current_password).await?;
                            client.change_password(&new_password).await
                        }
                        .await;
                        match outcome {
                            Ok(()) => {
                                let _ = ui_tx.try_send(UiEvent::PasswordChanged);
                            }
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_client(
                                    UiErrorContext::PasswordChange,
                                    &err,
                                )));
                            }
                        }
                    }
                    BackendCommand::UploadAvatar { path } => {
                        let outcome = match tokio::fs::read(&path).await {
                            Ok(bytes) => {
                                client.upload_avatar(bytes, &upload_filename(&path)).await
                            }
                            Err(err) => Err(shared::error::ClientError::validation(format!(
                                "could not read '{}': {err}",
                                path.display()
                            ))),
                        };
                        match outcome {
                            Ok(url) => {
                                let _ = ui_tx.try_send(UiEvent::AvatarUploaded(url));
                            }
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_client(
                                    UiErrorContext::Profile,
                                    &err,
                                )));
                            }
                        }
                    }
                    BackendCommand::CreateEntity { kind, draft } => {
                        match create_entity(&client, kind, draft).await {
                            Ok(entity_id) => {
                                let _ =
                                    ui_tx.try_send(UiEvent::EntityCreated { kind, entity_id });
                                if let Ok(entities) = client.list_entities(kind).await {
                                    let _ = ui_tx.try_send(UiEvent::EntitiesSnapshot {
                                        kind,
                                        entities,
                                    });
                                }
                            }
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::EntityCreateFailed {
                                    kind,
                                    error: UiError::from_client(
                                        UiErrorContext::CreateEntity,
                                        &err,
                                    ),
                                });
                            }
                        }
                    }
                    BackendCommand::RefreshEntities { kind } => {
                        match client.list_entities(kind).await {
                            Ok(entities) => {
                                let _ = ui_tx
                                    .try_send(UiEvent::EntitiesSnapshot { kind, entities });
                            }
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_client(
                                    UiErrorContext::General,
                                    &err,
                                )));
                            }
                        }
                    }
                    BackendCommand::WatchEntities { kind } => {
                        client.watch_entities(kind).await;
                    }
                    BackendCommand::FetchImage { url } => {
                        let outcome = client
                            .fetch_image(&url)
                            .await
                            .map_err(|err| err.to_string())
                            .and_then(|bytes| decode_image(&bytes));
                        let event = match outcome {
                            Ok(image) => UiEvent::ImageLoaded { url, image },
                            Err(reason) => UiEvent::ImageLoadFailed { url, reason },
                        };
                        let _ = ui_tx.try_send(event);
                    }
                }
            }
        });
    });
}

/// Uploads the draft's local image first (when present), then hands the
/// stamped payload to the writer. A failed upload aborts the create so the
/// draft survives for a retry.
async fn create_entity(
    client: &std::sync::Arc<FluxClient>,
    kind: EntityKind,
    draft: shared::domain::EntityDraft,
) -> shared::error::ClientResult<shared::domain::EntityId> {
    draft.validate()?;
    let session = client
        .session()
        .await
        .ok_or_else(shared::error::ClientError::no_session)?;

    let image_url = match &draft.local_image {
        Some(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|err| {
                shared::error::ClientError::validation(format!(
                    "could not read '{}': {err}",
                    path.display()
                ))
            })?;
            Some(client.upload_image(bytes, &upload_filename(path)).await?)
        }
        None => None,
    };

    let owner = UserId::from(session.user_id.as_str());
    let entity = NewEntity::from_draft(&draft, owner, image_url);
    client.create(kind, entity).await
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    spawn_backend_thread(cmd_rx, ui_tx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Flux")
            .with_inner_size([1080.0, 720.0])
            .with_min_inner_size([720.0, 520.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Flux",
        options,
        Box::new(|cc| {
            let persisted = cc.storage.and_then(|storage| {
                storage
                    .get_string(SETTINGS_STORAGE_KEY)
                    .and_then(|text| serde_json::from_str::<PersistedSettings>(&text).ok())
            });
            Ok(Box::new(FluxApp::new(cmd_tx, ui_rx, persisted)))
        }),
    )
}
