use clap::Parser;
use ggmcore::curve::{DisplayPoint, DISPLAY_HEIGHT, DISPLAY_WIDTH};
use ggmcore::params::CombinationParameters;
use ggmcore::prelude::{GgmError, GgmResult};
use ggmcore::session::{CombineSession, Edit, ImageSlot, DEFAULT_OUTPUT_PARAMETERS};
use ggmcore::viewer::{Ds9Viewer, ImageViewer, NullViewer};
use iced::{
    mouse,
    widget::{
        button,
        canvas::{self, Canvas, Frame, Geometry, Path, Stroke},
        column, row, scrollable, text, text_input, Column, Container,
    },
    Alignment, Color, Element, Length, Point, Rectangle, Renderer, Task, Theme,
};
use log::{error, info};
use std::path::PathBuf;

const MARGIN: f32 = 6.0;
const MARKER_RADIUS: f32 = 5.0;
const HISTORY_LIMIT: usize = 20;

#[derive(Parser, Clone)]
#[command(author, version, about = "Interactive weight-curve editor for image combination")]
struct Args {
    /// Combination parameter file
    params: PathBuf,
    /// Where the updated parameters are written
    #[arg(long, default_value = DEFAULT_OUTPUT_PARAMETERS)]
    out_pars: PathBuf,
    /// Do not send the result to DS9
    #[arg(long, default_value_t = false)]
    no_viewer: bool,
    /// XPA target of the DS9 instance
    #[arg(long, default_value = "ds9")]
    viewer_target: String,
}

fn main() -> iced::Result {
    env_logger::init();
    let args = Args::parse();

    iced::application(move || Editor::boot(&args), Editor::update, Editor::view)
        .title(application_title)
        .theme(application_theme)
        .run()
}

fn application_title(state: &Editor) -> String {
    format!("GGM combine - {}", state.params_name)
}

fn application_theme(_: &Editor) -> Theme {
    Theme::Dark
}

type EditorSession = CombineSession<Box<dyn ImageViewer>>;

fn open_session(args: &Args) -> GgmResult<EditorSession> {
    let params = CombinationParameters::load(&args.params)?;
    let viewer: Box<dyn ImageViewer> = if args.no_viewer {
        Box::new(NullViewer)
    } else {
        Box::new(Ds9Viewer::new(args.viewer_target.clone()))
    };
    let mut session = CombineSession::open(params, viewer, &args.out_pars)?;
    session.redraw()?;
    Ok(session)
}

struct Editor {
    params_name: String,
    session: Option<EditorSession>,
    scale_fields: Vec<String>,
    status: String,
    history: Vec<String>,
}

#[derive(Debug, Clone)]
enum Message {
    CurveDragged {
        index: usize,
        marker: usize,
        point: DisplayPoint,
    },
    ScaleEdited(usize, String),
    ScaleSubmitted(usize),
    FlipSign(usize),
}

impl Editor {
    fn boot(args: &Args) -> (Self, Task<Message>) {
        let params_name = args.params.display().to_string();
        let mut editor = Editor {
            params_name,
            session: None,
            scale_fields: Vec::new(),
            status: String::new(),
            history: Vec::new(),
        };
        match open_session(args) {
            Ok(session) => {
                editor.status = format!(
                    "Loaded {} images, parameters written to {}",
                    session.len(),
                    session.out_pars().display()
                );
                editor.session = Some(session);
                editor.sync_fields();
            }
            Err(err) => {
                error!("opening {}: {}", args.params.display(), err);
                editor.status = format!("Could not open {}: {err}", args.params.display());
            }
        }
        (editor, Task::none())
    }

    fn update(state: &mut Self, message: Message) -> Task<Message> {
        match message {
            Message::CurveDragged {
                index,
                marker,
                point,
            } => {
                let snapshot = state.session.as_ref().map(|session| {
                    session
                        .slot(index)
                        .ok_or(GgmError::IndexOutOfRange {
                            index,
                            len: session.len(),
                        })
                        .and_then(|slot| slot.curve().moved_point(marker, point, slot.transform()))
                });
                match snapshot {
                    Some(Ok(snapshot)) => state.apply(
                        Edit::Curve { index, snapshot },
                        format!("Image {}: moved point {}", index, marker),
                    ),
                    Some(Err(err)) => state.report_rejected(err),
                    None => {}
                }
            }
            Message::ScaleEdited(index, value) => {
                if let Some(field) = state.scale_fields.get_mut(index) {
                    *field = value;
                }
            }
            Message::ScaleSubmitted(index) => {
                let entered = state.scale_fields.get(index).cloned().unwrap_or_default();
                match entered.trim().parse::<f64>() {
                    Ok(value) => state.apply(
                        Edit::Scale { index, value },
                        format!("Image {}: scale {}", index, value),
                    ),
                    Err(_) => {
                        state.status = format!("'{}' is not a number", entered.trim());
                        state.sync_field(index);
                    }
                }
            }
            Message::FlipSign(index) => {
                state.apply(
                    Edit::ToggleSign { index },
                    format!("Image {}: sign flipped", index),
                );
            }
        }
        Task::none()
    }

    fn view(state: &Self) -> Element<'_, Message> {
        let curves = match &state.session {
            Some(session) => session.slots().iter().enumerate().fold(
                Column::new().spacing(12),
                |col, (index, slot)| col.push(image_row(index, slot, &state.scale_fields)),
            ),
            None => Column::new().push(text("No session loaded").size(14)),
        };

        let metrics = state
            .session
            .as_ref()
            .map(|session| {
                let metrics = session.metrics();
                format!("Redraws: {} | rejected edits: {}", metrics.redraws, metrics.rejected)
            })
            .unwrap_or_default();

        let history_list = if state.history.is_empty() {
            Column::new().push(text("No activity yet").size(12))
        } else {
            state
                .history
                .iter()
                .rev()
                .fold(Column::new().spacing(4), |col, entry| {
                    col.push(text(entry.clone()).size(12))
                })
        };

        let layout = column![
            text("Weight curves").size(26),
            text("Horizontal axis: sqrt(radius); vertical axis: weight").size(12),
            Container::new(scrollable(curves).height(Length::Fill)).padding(6),
            text(&state.status).size(14),
            text(metrics).size(12),
            text("Activity log").size(16),
            Container::new(scrollable(history_list).height(Length::Fixed(120.0))).padding(6),
        ]
        .spacing(10)
        .padding(20);

        Container::new(layout)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn apply(&mut self, edit: Edit, label: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let index = edit.index();
        match session.apply(edit) {
            Ok(()) => {
                info!("{}", label);
                self.status = format!("{} (redraw {})", label, session.metrics().redraws);
                self.push_history(label);
            }
            Err(err) => self.report_rejected(err),
        }
        self.sync_field(index);
    }

    fn report_rejected(&mut self, err: GgmError) {
        self.status = format!("Edit rejected: {err}");
        self.push_history(format!("Rejected: {err}"));
    }

    fn sync_fields(&mut self) {
        self.scale_fields = self
            .session
            .as_ref()
            .map(|session| {
                session
                    .slots()
                    .iter()
                    .map(|slot| slot.scale().to_string())
                    .collect()
            })
            .unwrap_or_default();
    }

    /// Show the stored scale of one row; text typed in other rows is kept.
    fn sync_field(&mut self, index: usize) {
        let scale = self
            .session
            .as_ref()
            .and_then(|session| session.slot(index))
            .map(ImageSlot::scale);
        if let Some(scale) = scale {
            resync_field(&mut self.scale_fields, index, scale);
        }
    }

    fn push_history(&mut self, entry: String) {
        self.history.push(entry);
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }
    }
}

fn resync_field(fields: &mut [String], index: usize, scale: f64) {
    if let Some(field) = fields.get_mut(index) {
        *field = scale.to_string();
    }
}

fn image_row<'a>(index: usize, slot: &ImageSlot, fields: &'a [String]) -> Element<'a, Message> {
    let field = fields.get(index).map(String::as_str).unwrap_or_default();
    let state_label = if slot.enabled() { "on" } else { "off" };

    let curve = Canvas::new(CurveCanvas::new(index, slot))
        .width(Length::Fixed(DISPLAY_WIDTH as f32 + 2.0 * MARGIN))
        .height(Length::Fixed(DISPLAY_HEIGHT as f32 + 2.0 * MARGIN));

    row![
        column![text(slot.filename().display().to_string()).size(14), curve].spacing(4),
        text_input("Scale", field)
            .on_input(move |value| Message::ScaleEdited(index, value))
            .on_submit(Message::ScaleSubmitted(index))
            .padding(6)
            .width(Length::Fixed(120.0)),
        button("Flip sign")
            .on_press(Message::FlipSign(index))
            .padding(8),
        text(state_label).size(14),
    ]
    .spacing(12)
    .align_y(Alignment::Center)
    .into()
}

fn to_canvas(point: DisplayPoint) -> Point {
    Point::new(point.x as f32 + MARGIN, point.y as f32 + MARGIN)
}

fn from_canvas(point: Point) -> DisplayPoint {
    DisplayPoint {
        x: f64::from(point.x - MARGIN).clamp(0.0, DISPLAY_WIDTH),
        y: f64::from(point.y - MARGIN).clamp(0.0, DISPLAY_HEIGHT),
    }
}

/// One curve drawn in display coordinates with draggable markers.
struct CurveCanvas {
    index: usize,
    markers: Vec<Point>,
    line: Vec<Point>,
}

impl CurveCanvas {
    fn new(index: usize, slot: &ImageSlot) -> Self {
        let transform = slot.transform();
        let curve = slot.curve();
        let markers = curve
            .display_points(transform)
            .into_iter()
            .map(to_canvas)
            .collect();
        let samples = curve.sample_display(transform, DISPLAY_WIDTH as usize);
        let line = samples
            .radii
            .iter()
            .zip(&samples.weights)
            .map(|(&r, &w)| to_canvas(transform.to_display(r, w)))
            .collect();
        Self {
            index,
            markers,
            line,
        }
    }
}

#[derive(Debug, Default)]
struct DragState {
    marker: Option<usize>,
    position: Option<Point>,
}

impl canvas::Program<Message> for CurveCanvas {
    type State = DragState;

    fn update(
        &self,
        state: &mut Self::State,
        event: &canvas::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<Message>> {
        match event {
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                let position = cursor.position_in(bounds)?;
                let marker = self
                    .markers
                    .iter()
                    .position(|m| m.distance(position) <= MARKER_RADIUS + 2.0)?;
                state.marker = Some(marker);
                state.position = Some(position);
                Some(canvas::Action::request_redraw().and_capture())
            }
            canvas::Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                state.marker?;
                let position = cursor.position()?;
                state.position = Some(Point::new(position.x - bounds.x, position.y - bounds.y));
                Some(canvas::Action::request_redraw().and_capture())
            }
            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                let marker = state.marker.take()?;
                let position = state.position.take()?;
                Some(
                    canvas::Action::publish(Message::CurveDragged {
                        index: self.index,
                        marker,
                        point: from_canvas(position),
                    })
                    .and_capture(),
                )
            }
            _ => None,
        }
    }

    fn draw(
        &self,
        state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        frame.fill_rectangle(
            Point::ORIGIN,
            bounds.size(),
            Color::from_rgb(0.05, 0.05, 0.05),
        );

        let right = MARGIN + DISPLAY_WIDTH as f32;
        let bottom = MARGIN + DISPLAY_HEIGHT as f32;
        let guides = Path::new(|builder| {
            builder.move_to(Point::new(MARGIN, MARGIN));
            builder.line_to(Point::new(right, MARGIN));
            builder.move_to(Point::new(MARGIN, bottom));
            builder.line_to(Point::new(right, bottom));
        });
        frame.stroke(
            &guides,
            Stroke::default()
                .with_color(Color::from_rgb(0.35, 0.35, 0.45))
                .with_width(1.0),
        );

        if self.line.len() > 1 {
            let path = Path::new(|builder| {
                for (i, point) in self.line.iter().enumerate() {
                    if i == 0 {
                        builder.move_to(*point);
                    } else {
                        builder.line_to(*point);
                    }
                }
            });
            frame.stroke(
                &path,
                Stroke::default()
                    .with_width(2.0)
                    .with_color(Color::from_rgb(0.18, 0.72, 0.89)),
            );
        }

        for (i, marker) in self.markers.iter().enumerate() {
            let centre = match (state.marker, state.position) {
                (Some(dragged), Some(position)) if dragged == i => position,
                _ => *marker,
            };
            let circle = Path::new(|builder| builder.circle(centre, MARKER_RADIUS));
            frame.fill(&circle, Color::from_rgb(0.95, 0.55, 0.2));
        }

        vec![frame.into_geometry()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resync_leaves_other_rows_as_typed() {
        let mut fields = vec!["2".to_string(), "0.7".to_string(), "1.5".to_string()];
        resync_field(&mut fields, 0, -2.0);
        assert_eq!(fields, vec!["-2", "0.7", "1.5"]);

        resync_field(&mut fields, 5, 3.0);
        assert_eq!(fields, vec!["-2", "0.7", "1.5"]);
    }

    #[test]
    fn canvas_points_clamp_to_display_box() {
        let inside = from_canvas(to_canvas(DisplayPoint { x: 10.0, y: 20.0 }));
        assert_eq!(inside, DisplayPoint { x: 10.0, y: 20.0 });

        let outside = from_canvas(Point::new(-50.0, 1000.0));
        assert_eq!(outside.x, 0.0);
        assert_eq!(outside.y, DISPLAY_HEIGHT);
    }
}
